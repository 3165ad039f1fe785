pub mod jsonish;
pub mod util;
