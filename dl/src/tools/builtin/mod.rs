//! Built-in tools
//!
//! File operations plus the analysis tools the refactoring workflows
//! require as first steps.

mod analyze_usage;
mod compare_files;
mod edit_file;
mod list_directory;
mod read_architecture;
mod read_file;
mod search;
mod write_file;

pub use analyze_usage::AnalyzeUsageTool;
pub use compare_files::CompareFilesTool;
pub use edit_file::EditFileTool;
pub use list_directory::ListDirectoryTool;
pub use read_architecture::ReadArchitectureTool;
pub use read_file::ReadFileTool;
pub use search::SearchTool;
pub use write_file::WriteFileTool;
