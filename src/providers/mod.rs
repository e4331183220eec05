//! Collaborators a download session depends on
//!
//! The engine only talks to providers through the traits in [`traits`]. A few
//! default implementations are provided for hosts that do not need their own:
//!
//! - [`HttpTransport`]: fetches pages over HTTP(S) with `reqwest`
//! - [`DiskCommitter`]: writes pages as `page 0001.<ext>` files
//! - [`ComicInfoVolumeReader`]: reads `<Volume>` from a `.cbz`'s ComicInfo.xml

mod comicinfo;
mod disk;
mod http;
pub mod traits;

pub use comicinfo::ComicInfoVolumeReader;
pub use disk::{DEFAULT_PAGE_EXTENSION, DiskCommitter};
pub use http::{DEFAULT_REQUEST_TIMEOUT_SECS, HttpTransport};
pub use traits::{
    Chapter, ChapterLister, Client, ContentProvider, PreferenceSource, Series, TaskCommitter,
    Transport, VolumeReader,
};
