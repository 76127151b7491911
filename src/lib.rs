#[macro_use]
mod debug_trace;

pub mod base;
pub mod dom;
pub mod env;
pub mod errors;
pub mod expander;
pub mod frame;
pub mod html2wt;
pub mod page_bundle;
pub mod tokens;

pub use self::base::CancellationToken;
pub use self::env::{Env, SiteConfig};
pub use self::frame::Frame;
pub use self::page_bundle::PageBundle;
