#![forbid(unsafe_code)]

pub mod chapter;
pub mod clean;
pub mod cli;
pub mod dom;
pub mod footnotes;
pub mod formats;
pub mod frontend;
pub mod ids;
pub mod logging;
pub mod markdown;
pub mod pipeline;
pub mod split;
