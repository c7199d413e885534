//! Isolated host for the offline bundle.
//!
//! An [`IsolatedHost`] loads one bundle into a session whose request gate was
//! installed before the host existed, and runs bundle [`Script`]s on a
//! separate renderer. Scripts only ever see a [`ContentWindow`].

mod document;
mod error;
mod host;
mod renderer;
mod script;
mod window;

pub use document::*;
pub use error::*;
pub use host::*;
pub use renderer::RendererMode;
pub use script::*;
pub use window::*;
