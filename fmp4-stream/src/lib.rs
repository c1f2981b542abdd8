//! # fmp4-stream
//!
//! Just enough of the ISO Base Media File Format (ISO/IEC 14496-12) to replay stored CMAF content as a live feed.
//!
//! - [IngestStream] loads one CMAF track file into its init segment and an ordered list of [Fragment]s.
//!   The timeline can be rebased with [IngestStream::patch] so a finite asset can loop forever.
//! - [sparse] builds the timed metadata track: a sparse init segment and one fragment per [Emsg] event.
//! - [scte35] encodes the splice insert messages carried by those events.
//!
//! Parsing of `moov` and `moof` is delegated to the `mp4` crate.
//! Writing, and the in-place `tfdt` rewrite, is done with the small [atom] codec in this crate.

pub mod atom;
mod error;
mod fragment;
pub mod scte35;
pub mod sparse;
mod stream;

pub use atom::FourCC;
pub use error::*;
pub use fragment::*;
pub use sparse::Emsg;
pub use stream::*;
