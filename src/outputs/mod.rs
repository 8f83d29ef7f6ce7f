//! Where archived content ends up.
//!
//! # Submodules
//!
//! - [`sink`]: the [`sink::StorageSink`] trait and the local directory sink
//! - [`fanout`]: the worker pool storing one object per month bucket
//! - [`summary`]: the optional JSON report of every group run
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── gg-golang-checkins/
//! │   ├── 2018-09.txt
//! │   └── flagged.txt
//! ├── pipermail-python-dev/
//! │   └── 2019-03.txt.gz
//! └── mailman-python-dev@python.org/
//!     └── 2020-04.mbox.gz
//! ```

pub mod fanout;
pub mod sink;
pub mod summary;
