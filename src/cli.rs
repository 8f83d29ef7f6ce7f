//! Command-line interface definitions for the list archiver.
//!
//! Most options can also be provided through environment variables, which
//! is how scheduled runs usually configure the binary.

use clap::{Parser, ValueEnum};
use std::fmt;
use std::path::PathBuf;

/// Kind of archive a run reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Source {
    /// Google Groups escaped-fragment pages
    GoogleGroups,
    /// Pipermail monthly gzip archives
    Pipermail,
    /// Mailman 3 monthly mbox exports
    Mailman,
}

impl Source {
    /// Prefix of the default per-group subdirectory.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::GoogleGroups => "gg",
            Self::Pipermail => "pipermail",
            Self::Mailman => "mailman",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::GoogleGroups => "google-groups",
            Self::Pipermail => "pipermail",
            Self::Mailman => "mailman",
        })
    }
}

/// Command-line arguments for the list archiver.
///
/// # Examples
///
/// ```sh
/// # Yesterday's Google Groups topics for two groups
/// list_archiver -g "golang-checkins golang-nuts" -w 8 -o ./archive
///
/// # Every month of a Pipermail list
/// list_archiver -s pipermail -g python-dev --all-dates
///
/// # Mailman exports for one quarter
/// list_archiver -s mailman -g python-dev@python.org --start-date 2020-01-01 --end-date 2020-03-31
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Archive type to read from
    #[arg(short, long, value_enum, env = "ARCHIVE_SOURCE", default_value_t = Source::GoogleGroups)]
    pub source: Source,

    /// Groups or lists to archive, space separated
    #[arg(short, long, env = "ARCHIVE_GROUPS", value_delimiter = ' ', num_args = 1.., required = true)]
    pub group_names: Vec<String>,

    /// Organisation path for Google Groups hosted under a domain, e.g. /a/example.org
    #[arg(long, env = "ARCHIVE_ORG", default_value = "")]
    pub org: String,

    /// Subdirectory per group, in the same order as the groups
    #[arg(long, value_delimiter = ' ', num_args = 1..)]
    pub subdirectories: Vec<String>,

    /// First day to archive (YYYY-MM-DD); defaults to yesterday. With
    /// --all-dates it sets the first month of Mailman exports
    #[arg(long)]
    pub start_date: Option<String>,

    /// Last day to archive (YYYY-MM-DD); defaults to today
    #[arg(long)]
    pub end_date: Option<String>,

    /// Archive everything regardless of date
    #[arg(long, conflicts_with = "end_date")]
    pub all_dates: bool,

    /// Number of concurrent workers per stage
    #[arg(short, long, env = "ARCHIVE_WORKERS", default_value_t = 1)]
    pub workers: usize,

    /// Root directory archived objects are written under
    #[arg(short, long, env = "ARCHIVE_OUTPUT_DIR", default_value = "archive")]
    pub output_dir: PathBuf,

    /// Write a JSON summary of every group run to this path
    #[arg(long)]
    pub summary_json: Option<PathBuf>,

    /// Retry attempts for transient HTTP failures
    #[arg(long, default_value_t = 3)]
    pub max_retries: usize,

    /// Per-request HTTP timeout in seconds
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,

    /// Override the archive host, e.g. for a mirror
    #[arg(long, env = "ARCHIVE_BASE_URL")]
    pub base_url: Option<String>,
}

impl Cli {
    /// Subdirectory for the group at `index`: the explicit one if given,
    /// otherwise `<source prefix>-<group>`.
    pub fn subdirectory_for(&self, index: usize, group: &str) -> String {
        self.subdirectories
            .get(index)
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("{}-{}", self.source.prefix(), group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "list_archiver",
            "--group-names",
            "golang-checkins golang-nuts",
            "--workers",
            "8",
            "--output-dir",
            "./archive",
        ]);

        assert_eq!(cli.source, Source::GoogleGroups);
        assert_eq!(cli.group_names, vec!["golang-checkins", "golang-nuts"]);
        assert_eq!(cli.workers, 8);
        assert_eq!(cli.output_dir, PathBuf::from("./archive"));
        assert_eq!(cli.max_retries, 3);
        assert!(!cli.all_dates);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "list_archiver",
            "-s",
            "pipermail",
            "-g",
            "python-dev",
            "-w",
            "4",
            "-o",
            "/tmp/archive",
        ]);

        assert_eq!(cli.source, Source::Pipermail);
        assert_eq!(cli.group_names, vec!["python-dev"]);
        assert_eq!(cli.workers, 4);
        assert_eq!(cli.output_dir, PathBuf::from("/tmp/archive"));
    }

    #[test]
    fn test_subdirectory_defaults() {
        let cli = Cli::parse_from([
            "list_archiver",
            "-g",
            "golang-checkins golang-nuts",
            "--subdirectories",
            "checkins",
        ]);
        assert_eq!(cli.subdirectory_for(0, "golang-checkins"), "checkins");
        assert_eq!(cli.subdirectory_for(1, "golang-nuts"), "gg-golang-nuts");
    }

    #[test]
    fn test_all_dates_conflicts_with_end_date() {
        let parsed = Cli::try_parse_from([
            "list_archiver",
            "-g",
            "golang-nuts",
            "--all-dates",
            "--end-date",
            "2020-01-01",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_all_dates_accepts_start_floor() {
        let cli = Cli::parse_from([
            "list_archiver",
            "-s",
            "mailman",
            "-g",
            "numpy-discussion@python.org",
            "--all-dates",
            "--start-date",
            "2015-01-01",
        ]);
        assert!(cli.all_dates);
        assert_eq!(cli.start_date.as_deref(), Some("2015-01-01"));
    }

    #[test]
    fn test_source_display_and_prefix() {
        assert_eq!(Source::GoogleGroups.to_string(), "google-groups");
        assert_eq!(Source::Mailman.prefix(), "mailman");
    }
}
