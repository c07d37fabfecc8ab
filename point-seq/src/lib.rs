pub mod common_io;
pub mod padding;
pub mod point_sequence;
pub mod scaler;
pub mod sources;
pub mod tensor_io;

pub use padding::{LengthPolicy, PaddedSequences};
pub use point_sequence::{Point, PointSequence};
pub use scaler::PointScaler;
pub use sources::{write_point_sequence, PointFile, PointFileList, PointSequenceSource};
