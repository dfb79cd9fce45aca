pub mod check;
pub mod diff;
pub mod init;
pub mod jobs;
pub mod run;

use tally_core::SourceConfig;

/// `sheet 1AbC… Leads!A:E`, `folder tree 1AbC…` or `drive json 1AbC…`
pub(crate) fn describe_source(source: &SourceConfig) -> String {
    match source {
        SourceConfig::Sheet {
            spreadsheet_id,
            range,
            ..
        } => format!("sheet {spreadsheet_id} {range}"),
        SourceConfig::FolderTree {
            root_folder_id,
            group_size,
            ..
        } => format!("folder tree {root_folder_id} (groups of {group_size})"),
        SourceConfig::DriveJson { file_id, .. } => format!("drive json {file_id}"),
    }
}
