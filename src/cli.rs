// CLI argument definitions using clap
//
// Flag names keep the underscore spelling (`--dest_id`, `--list_files`)
// that SecureBox users already script against.

use std::path::PathBuf;

use clap::{ArgAction, ArgGroup, Parser, ValueHint};

/// SecureBox client: sign, encrypt and share files through the SecureBox service
#[derive(Parser, Debug)]
#[command(name = "securebox")]
#[command(author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["upload", "download", "list_files", "delete_file", "encrypt", "sign", "enc_sign"])
))]
pub struct Cli {
    /// Sign, encrypt and upload a file for the user given with --dest_id
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath, requires = "dest_id")]
    pub upload: Option<String>,

    /// Download a file, decrypt it and verify the signature of --source_id
    #[arg(long, value_name = "FILE_ID", requires = "source_id")]
    pub download: Option<String>,

    /// List all files belonging to the token's user
    #[arg(long = "list_files")]
    pub list_files: bool,

    /// Delete a file from SecureBox
    #[arg(long = "delete_file", value_name = "FILE_ID")]
    pub delete_file: Option<String>,

    /// Encrypt a file locally for the user given with --dest_id
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath, requires = "dest_id")]
    pub encrypt: Option<String>,

    /// Sign a file locally
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub sign: Option<String>,

    /// Sign and then encrypt a file locally for --dest_id
    #[arg(long = "enc_sign", value_name = "FILE", value_hint = ValueHint::FilePath, requires = "dest_id")]
    pub enc_sign: Option<String>,

    /// ID of the receiving user
    #[arg(long = "dest_id", value_name = "ID")]
    pub dest_id: Option<String>,

    /// ID of the sending user
    #[arg(long = "source_id", value_name = "ID")]
    pub source_id: Option<String>,

    /// Config file (default: <config dir>/securebox/config.toml)
    #[arg(long, env = "SECUREBOX_CONFIG", value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Base URL of the SecureBox API
    #[arg(long, env = "SECUREBOX_API_URL")]
    pub api_url: Option<String>,

    /// Bearer token used to authenticate
    #[arg(long, env = "SECUREBOX_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Directory where signed, encrypted and downloaded files are kept
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub files_dir: Option<PathBuf>,

    /// Increase log verbosity (-d, -dd, -ddd)
    #[arg(short, long, action = ArgAction::Count)]
    pub debug: u8,
}

/// The single action selected on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Upload { file: String, dest_id: String },
    Download { file_id: String, source_id: String },
    ListFiles,
    DeleteFile { file_id: String },
    Encrypt { file: String, dest_id: String },
    Sign { file: String },
    EncSign { file: String, dest_id: String },
}

impl Cli {
    /// Collapse the flag set into one `Action`. clap guarantees exactly one
    /// action flag and the ids it requires, so `None` only happens for
    /// hand-built values.
    pub fn action(&self) -> Option<Action> {
        let dest = || self.dest_id.clone();
        if let Some(file) = &self.upload {
            return dest().map(|dest_id| Action::Upload { file: file.clone(), dest_id });
        }
        if let Some(file_id) = &self.download {
            return self.source_id.clone().map(|source_id| Action::Download {
                file_id: file_id.clone(),
                source_id,
            });
        }
        if self.list_files {
            return Some(Action::ListFiles);
        }
        if let Some(file_id) = &self.delete_file {
            return Some(Action::DeleteFile { file_id: file_id.clone() });
        }
        if let Some(file) = &self.encrypt {
            return dest().map(|dest_id| Action::Encrypt { file: file.clone(), dest_id });
        }
        if let Some(file) = &self.sign {
            return Some(Action::Sign { file: file.clone() });
        }
        if let Some(file) = &self.enc_sign {
            return dest().map(|dest_id| Action::EncSign { file: file.clone(), dest_id });
        }
        None
    }
}
