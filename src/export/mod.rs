//! CSV export of harvest files.
//!
//! [`flatten_file`] turns one harvest JSON file into tracks, artists and
//! relationships tables; [`merge_csv_dir`] concatenates CSV files that share
//! a header.

mod flatten;
mod merge;

pub use flatten::{
    flatten_file, flatten_output, latest_json, ArtistRow, FlattenSummary, RelationshipRow,
    TrackRow, ARTISTS_FILE, RELATIONSHIPS_FILE, TRACKS_FILE,
};
pub use merge::{merge_csv_dir, MergeSummary};
