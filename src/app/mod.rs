pub mod apps;
pub mod common;
pub mod display;
pub mod error;
pub mod lifecycle;
pub mod logging;

pub use apps::{handle_apps, handle_info, handle_register};
pub use lifecycle::{
    handle_install, handle_rebuild, handle_restart, handle_start, handle_stop, handle_uninstall,
};
