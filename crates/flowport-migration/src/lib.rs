mod checksum;
mod copy;
mod marker;
mod migrator;
mod verify;

pub use checksum::{sha256_file, sha256_hex};
pub use copy::{copy_user_data_tree, count_user_data_files, CopySummary};
pub use marker::{
    clear_deletion_marker, has_deletion_marker, indicate_deletion, marker_path,
    remove_folder_if_exists, verify_superseded_copy_present,
};
pub use migrator::{
    move_user_data_folder, move_user_data_folder_with_progress, verify_user_data_after_move,
    MigrationReport, VerificationReport,
};

#[cfg(test)]
mod tests;
