pub mod clocks;
pub mod commands;
pub mod error;
pub mod model;
pub mod render;
pub mod server;
pub mod signature;
pub mod state;

pub use clocks::{parse_clock_spec, ClockConfig};
pub use commands::{CommandKind, OverlayCallbacks, OverlayCommand};
pub use model::{ActiveEvent, ActiveState, EventKind, InfoCard, OverlayChange, ScheduleEntry};
pub use render::{render, OverlayTheme, RenderOptions};
pub use server::{OverlayHttpServer, OverlayServerConfig, StartOutcome};
pub use state::{OverlaySnapshot, OverlayStateManager};
