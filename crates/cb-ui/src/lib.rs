//! Desktop frontend for corebridge

pub mod app;
pub mod input;
pub mod presenter;

pub use app::CorebridgeApp;
pub use presenter::EguiPresenter;
