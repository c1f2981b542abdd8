use crate::FourCC;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	#[error("mp4 error: {0}")]
	Mp4(#[from] mp4::Error),

	#[error("missing atom: {0}")]
	MissingAtom(FourCC),

	#[error("{0} atom without its pair")]
	Orphan(FourCC),

	#[error("no media fragments")]
	Empty,

	#[error("invalid size")]
	InvalidSize,

	#[error("truncated atom")]
	Truncated,

	#[error("invalid timescale: {0}")]
	Timescale(u32),

	#[error("fragment without tfdt")]
	MissingTfdt,

	// Rebasing would overflow the 64-bit decode time.
	#[error("decode time too large")]
	TooLarge,
}

pub type Result<T> = std::result::Result<T, Error>;
