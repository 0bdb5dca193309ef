// Command layer: resolves settings, builds the API client and cipher, runs
// one workflow and prints the human-readable status lines.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::debug;

use crate::api::ApiClient;
use crate::cipher::OpensslCipher;
use crate::cli::{Action, Cli};
use crate::config::{self, ConfigFile, Overrides, Settings};
use crate::files;
use crate::{Error, Result};

pub fn execute(cli: &Cli) -> Result<()> {
    let action = cli
        .action()
        .ok_or_else(|| Error::Config("no action given".into()))?;
    let settings = load_settings(cli)?;
    debug!(api_url = %settings.api_url, files_dir = %settings.files_dir.display(), "settings resolved");
    run(&action, &settings)
}

pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let path = match &cli.config {
        Some(p) => p.clone(),
        None => config::default_config_path()?,
    };
    let file = ConfigFile::load(&path)?;
    Ok(Settings::resolve(
        file,
        Overrides {
            api_url: cli.api_url.clone(),
            token: cli.token.clone(),
            files_dir: cli.files_dir.clone(),
        },
    ))
}

pub fn run(action: &Action, settings: &Settings) -> Result<()> {
    match action {
        Action::Upload { file, dest_id } => {
            let api = ApiClient::from_settings(settings)?;
            let cipher = OpensslCipher::from_key_file(&settings.private_key, &api)?;
            println!("Requested upload of {file} to SecureBox");
            let outcome = with_spinner("Signing, encrypting and uploading...", || {
                files::upload(&api, &cipher, settings, file, dest_id)
            })?;
            println!("-> Uploading file to server...OK");
            println!("Upload completed, file ID: {}", outcome.file_id);
        }
        Action::Download { file_id, source_id } => {
            let api = ApiClient::from_settings(settings)?;
            let cipher = OpensslCipher::from_key_file(&settings.private_key, &api)?;
            let outcome = with_spinner("Downloading...", || {
                files::download(&api, &cipher, settings, file_id, source_id)
            })?;
            println!("-> Downloading file from SecureBox...OK");
            println!("-> {} bytes downloaded", outcome.bytes_downloaded);
            println!(
                "File {} downloaded and verified, saved to {}",
                outcome.file_name,
                outcome.saved_to.display()
            );
        }
        Action::ListFiles => {
            let api = ApiClient::from_settings(settings)?;
            let listing = with_spinner("Listing files...", || files::list(&api))?;
            if listing.num_files > 0 {
                println!("{} files found:", listing.num_files);
                for (index, entry) in listing.files_list.iter().enumerate() {
                    println!("[{}] File ID: {}", index + 1, entry);
                }
            } else {
                println!("No files found for the user owning this token.");
            }
        }
        Action::DeleteFile { file_id } => {
            let api = ApiClient::from_settings(settings)?;
            with_spinner("Deleting...", || files::delete(&api, file_id))?;
            println!("-> Deleting file...OK");
            println!("File with ID {file_id} has been deleted.");
        }
        Action::Encrypt { file, dest_id } => {
            let api = ApiClient::from_settings(settings)?;
            let cipher = OpensslCipher::from_key_file(&settings.private_key, &api)?;
            let out = files::encrypt(&cipher, settings, file, dest_id)?;
            println!("-> Encrypting file for user {dest_id}...OK ({})", out.display());
        }
        Action::Sign { file } => {
            // Signing never talks to the server, so no token is required.
            let cipher = OpensslCipher::from_key_file(&settings.private_key, NoDirectory)?;
            let out = files::sign(&cipher, settings, file)?;
            println!("-> Signing file...OK ({})", out.display());
        }
        Action::EncSign { file, dest_id } => {
            let api = ApiClient::from_settings(settings)?;
            let cipher = OpensslCipher::from_key_file(&settings.private_key, &api)?;
            let out = files::enc_sign(&cipher, settings, file, dest_id)?;
            println!("-> Signing and encrypting file for user {dest_id}...OK ({})", out.display());
        }
    }
    Ok(())
}

/// Render a failure the way the service reports it: server code and
/// description for API errors, a single line otherwise.
pub fn format_error(err: &Error) -> String {
    match err {
        Error::Api {
            action,
            code,
            description,
        } => format!("\n-> Error: {action}\n\t- Code: {code}\n\t- Info: {description}"),
        other => format!("Error: {other}"),
    }
}

pub fn report_error(err: &Error) {
    match err {
        Error::Api { .. } => println!("{}", format_error(err)),
        _ => println!("{}", format_error(err).red()),
    }
}

fn with_spinner<T>(msg: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(msg);
    spinner.enable_steady_tick(Duration::from_millis(100));
    let res = f();
    spinner.finish_and_clear();
    res
}

/// Key directory for operations that never look up another user.
struct NoDirectory;

impl crate::cipher::KeyDirectory for NoDirectory {
    fn public_key(&self, user_id: &str) -> Result<String> {
        Err(Error::Config(format!(
            "public key of {user_id} is not available offline"
        )))
    }
}
