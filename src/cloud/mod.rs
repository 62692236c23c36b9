//! Remote hub connectivity.
//!
//! | Module      | Role                                              |
//! |-------------|---------------------------------------------------|
//! | `hub`       | Capability traits implemented by hub SDK adapters |
//! | `link`      | Connection state machine, publish, receive loop   |
//! | `payload`   | JSON wire schema                                  |
//! | `reconnect` | Optional retry policy                             |

pub mod hub;
pub mod link;
pub mod payload;
pub mod reconnect;
