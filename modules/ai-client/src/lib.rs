pub mod claude;
pub mod error;
pub mod gemini;
pub mod traits;
pub mod util;

pub use claude::Claude;
pub use error::AiError;
pub use gemini::Gemini;
pub use traits::TextModel;
pub use util::{strip_code_blocks, truncate_to_char_boundary};
