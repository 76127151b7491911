mod cancel;
mod range;

pub use self::cancel::CancellationToken;
pub use self::range::{Dsr, SourceRange};
