//! Castify media server: serves one directory to renderers over HTTP with
//! byte ranges, converting files through [`casttranscode`] when needed.
//!
//! Also owns the process logging setup ([`logs::init_logging`]).

pub mod logs;
mod range;
mod server;

pub use range::{RangeError, mime_for, parse_range, serve_file};
pub use server::{
    MediaServer, MediaServerOptions, MediaState, ServerError, build_media_url, media_router,
};
