//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter       | Implements              | Connects to                |
//! |---------------|-------------------------|----------------------------|
//! | `sim_adc`     | `SpiDevice`             | Simulated MCP3008          |
//! | `sim_gpio`    | `OutputPin`             | Simulated GPIO line        |
//! | `sim_hub`     | HubClient / HubSession  | In-process hub             |
//! | `log_sink`    | StateListener           | Log output                 |
//! | `config_file` | ConfigPort              | JSON file                  |
//! | `time`        | ClockPort               | System clock               |
//! | `device_id`   | (none)                  | `/sys/class/net` MAC       |

pub mod config_file;
pub mod device_id;
pub mod log_sink;
pub mod sim_adc;
pub mod sim_gpio;
pub mod sim_hub;
pub mod time;
