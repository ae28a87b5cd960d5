pub mod app;

pub use app::AppState;
