// API client module: a small blocking HTTP client for the SecureBox REST
// API. Every call is a single POST against `{api_url}/{endpoint}` carrying
// the bearer token; non-success responses are turned into `Error::Api`
// using the server's `http_error_code` and `description` fields.

use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_LENGTH};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

use crate::cipher::KeyDirectory;
use crate::config::{Endpoints, Settings};
use crate::envelope::filename_from_disposition;
use crate::files::{Downloaded, FileStore};
use crate::{Error, Result};

/// Blocking client holding the reqwest client, the API base URL, the
/// endpoint table and the pre-built Authorization header.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    endpoints: Endpoints,
    auth: HeaderValue,
}

/// Body of `/download` and `/delete_file` requests.
#[derive(Serialize, Deserialize, Debug)]
pub struct FileIdRequest<'a> {
    pub file_id: &'a str,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PublicKeyRequest<'a> {
    #[serde(rename = "userID")]
    pub user_id: &'a str,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PublicKeyResponse {
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub file_id: String,
}

/// Response of `/list`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct FileListing {
    pub num_files: u64,
    #[serde(default)]
    pub files_list: Vec<FileEntry>,
}

/// One entry of a listing. The service has returned both bare ids and
/// records, so both shapes are accepted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum FileEntry {
    Id(String),
    Record {
        #[serde(alias = "fileID")]
        file_id: String,
        #[serde(default, alias = "fileName", skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
    },
}

impl FileEntry {
    pub fn id(&self) -> &str {
        match self {
            FileEntry::Id(id) => id,
            FileEntry::Record { file_id, .. } => file_id,
        }
    }
}

impl fmt::Display for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileEntry::Id(id) => write!(f, "{id}"),
            FileEntry::Record {
                file_id,
                file_name: Some(name),
            } => write!(f, "{file_id} ({name})"),
            FileEntry::Record { file_id, .. } => write!(f, "{file_id}"),
        }
    }
}

/// Error body returned by the service on failure.
#[derive(Deserialize, Debug)]
struct ErrorBody {
    http_error_code: serde_json::Value,
    #[serde(default)]
    description: String,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str, endpoints: Endpoints) -> Result<Self> {
        Self::with_client(Client::builder().build()?, base_url, token, endpoints)
    }

    /// Same as `new`, with a caller-configured reqwest client.
    pub fn with_client(client: Client, base_url: &str, token: &str, endpoints: Endpoints) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| Error::Config("API token contains invalid characters".into()))?;
        auth.set_sensitive(true);
        Ok(ApiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoints,
            auth,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(&settings.api_url, settings.token()?, settings.endpoints.clone())
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, self.auth.clone());
        headers
    }

    /// Authenticated POST against an endpoint path.
    pub fn post(&self, endpoint: &str) -> RequestBuilder {
        self.client
            .post(self.url(endpoint))
            .headers(self.auth_headers())
    }

    fn send(&self, action: &str, req: RequestBuilder) -> Result<Response> {
        let res = req.send()?;
        let status = res.status();
        debug!(%status, action, "response received");
        if status.is_success() {
            return Ok(res);
        }
        let body = match res.bytes() {
            Ok(body) => body.to_vec(),
            Err(e) => {
                warn!(%status, action, error = %e, "could not read error body");
                Vec::new()
            }
        };
        Err(api_error(action, status, &body))
    }

    pub fn upload_file(&self, path: &Path, file_name: &str) -> Result<UploadResponse> {
        let part = multipart::Part::file(path)
            .map_err(|e| Error::io(format!("opening {}", path.display()), e))?
            .file_name(file_name.to_string());
        let form = multipart::Form::new().part("ufile", part);

        debug!(path = %path.display(), file_name, "uploading");
        let action = format!("Uploading file {file_name}");
        let res = self.send(&action, self.post(&self.endpoints.upload).multipart(form))?;
        Ok(res.json()?)
    }

    pub fn download_file(&self, file_id: &str) -> Result<Downloaded> {
        let action = format!("Downloading file with ID {file_id}");
        let res = self.send(
            &action,
            self.post(&self.endpoints.download)
                .json(&FileIdRequest { file_id }),
        )?;

        let file_name = res
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition);
        let header_length = res
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = res.bytes()?.to_vec();
        debug!(bytes = body.len(), ?file_name, "downloaded");

        Ok(Downloaded {
            file_name: file_name.unwrap_or_else(|| file_id.to_string()),
            content_length: header_length.unwrap_or(body.len() as u64),
            body,
        })
    }

    pub fn list_files(&self) -> Result<FileListing> {
        let res = self.send("Listing files", self.post(&self.endpoints.list))?;
        Ok(res.json()?)
    }

    pub fn delete_file(&self, file_id: &str) -> Result<()> {
        let action = format!("Deleting file with ID {file_id}");
        self.send(
            &action,
            self.post(&self.endpoints.delete_file)
                .json(&FileIdRequest { file_id }),
        )?;
        Ok(())
    }

    pub fn get_public_key(&self, user_id: &str) -> Result<String> {
        let action = format!("Fetching public key of user {user_id}");
        let res = self.send(
            &action,
            self.post(&self.endpoints.public_key)
                .json(&PublicKeyRequest { user_id }),
        )?;
        let key: PublicKeyResponse = res.json()?;
        Ok(key.public_key)
    }
}

impl FileStore for ApiClient {
    fn upload(&self, path: &Path, file_name: &str) -> Result<String> {
        Ok(self.upload_file(path, file_name)?.file_id)
    }

    fn download(&self, file_id: &str) -> Result<Downloaded> {
        self.download_file(file_id)
    }

    fn list(&self) -> Result<FileListing> {
        self.list_files()
    }

    fn delete(&self, file_id: &str) -> Result<()> {
        self.delete_file(file_id)
    }
}

impl KeyDirectory for ApiClient {
    fn public_key(&self, user_id: &str) -> Result<String> {
        self.get_public_key(user_id)
    }
}

/// Build an `Error::Api` from a failed response. Falls back to the HTTP
/// status and raw body when the server did not send its JSON error shape.
pub fn api_error(action: &str, status: StatusCode, body: &[u8]) -> Error {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(err) => Error::Api {
            action: action.to_string(),
            code: match err.http_error_code {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            },
            description: err.description,
        },
        Err(_) => Error::Api {
            action: action.to_string(),
            code: status.as_u16().to_string(),
            description: String::from_utf8_lossy(body).trim().to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ApiClient {
        ApiClient::new("http://localhost:8080/api/", "s3cr3t", Endpoints::default()).unwrap()
    }

    #[test]
    fn url_joins_without_double_slash() {
        let api = client();
        assert_eq!(api.url("upload"), "http://localhost:8080/api/upload");
        assert_eq!(api.url("/list"), "http://localhost:8080/api/list");
    }

    #[test]
    fn post_carries_bearer_token() {
        let req = client().post("delete_file").build().unwrap();
        assert_eq!(req.method(), reqwest::Method::POST);
        assert_eq!(req.url().as_str(), "http://localhost:8080/api/delete_file");
        assert_eq!(
            req.headers().get(AUTHORIZATION).unwrap().to_str().unwrap(),
            "Bearer s3cr3t"
        );
    }

    #[test]
    fn token_with_newline_is_rejected() {
        let res = ApiClient::new("http://x", "bad\ntoken", Endpoints::default());
        assert!(matches!(res, Err(Error::Config(_))));
    }

    #[test]
    fn file_id_body_shape() {
        let body = serde_json::to_value(FileIdRequest { file_id: "abc" }).unwrap();
        assert_eq!(body, serde_json::json!({ "file_id": "abc" }));
        let body = serde_json::to_value(PublicKeyRequest { user_id: "42" }).unwrap();
        assert_eq!(body, serde_json::json!({ "userID": "42" }));
    }

    #[test]
    fn api_error_uses_server_fields() {
        let body = br#"{"http_error_code": "FILE1", "description": "File not found"}"#;
        match api_error("Downloading file with ID x", StatusCode::NOT_FOUND, body) {
            Error::Api {
                code, description, ..
            } => {
                assert_eq!(code, "FILE1");
                assert_eq!(description, "File not found");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn api_error_numeric_code() {
        let body = br#"{"http_error_code": 401, "description": "Bad token"}"#;
        match api_error("Listing files", StatusCode::UNAUTHORIZED, body) {
            Error::Api { code, .. } => assert_eq!(code, "401"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn api_error_falls_back_to_status() {
        match api_error("Listing files", StatusCode::BAD_GATEWAY, b"upstream down\n") {
            Error::Api {
                code, description, ..
            } => {
                assert_eq!(code, "502");
                assert_eq!(description, "upstream down");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn listing_accepts_ids_and_records() {
        let json = r#"{
            "num_files": 2,
            "files_list": ["id-1", {"fileID": "id-2", "fileName": "notes.txt"}]
        }"#;
        let listing: FileListing = serde_json::from_str(json).unwrap();
        assert_eq!(listing.num_files, 2);
        assert_eq!(listing.files_list[0].id(), "id-1");
        assert_eq!(listing.files_list[1].id(), "id-2");
        assert_eq!(listing.files_list[1].to_string(), "id-2 (notes.txt)");
    }

    #[test]
    fn empty_listing() {
        let listing: FileListing = serde_json::from_str(r#"{"num_files": 0}"#).unwrap();
        assert!(listing.files_list.is_empty());
    }

    // ============================================================
    // Requests against a local one-shot server
    // ============================================================

    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    /// Accept a single connection, answer with the given status line,
    /// headers and body, and hand back the raw request text.
    fn serve_once(status: &str, headers: &[(&str, &str)], body: &[u8]) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}/api", listener.local_addr().unwrap());
        let mut response = format!("HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n", body.len());
        for (name, value) in headers {
            response.push_str(&format!("{name}: {value}\r\n"));
        }
        response.push_str("\r\n");
        let mut response = response.into_bytes();
        response.extend_from_slice(body);

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            stream.write_all(&response).unwrap();
            stream.flush().unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (base_url, handle)
    }

    /// Read one HTTP request: headers, then a Content-Length or chunked body.
    fn read_request(stream: &mut impl Read) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            if let Some(pos) = find(&buf, b"\r\n\r\n") {
                break pos + 4;
            }
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "connection closed before headers were complete");
            buf.extend_from_slice(&chunk[..n]);
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let content_length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok());
        loop {
            let body = &buf[header_end..];
            let done = match content_length {
                Some(len) => body.len() >= len,
                None if head.contains("transfer-encoding: chunked") => find(body, b"0\r\n\r\n").is_some(),
                None => true,
            };
            if done {
                return buf;
            }
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                return buf;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    fn local_client(base_url: &str) -> ApiClient {
        let client = Client::builder().no_proxy().build().unwrap();
        ApiClient::with_client(client, base_url, "tok", Endpoints::default()).unwrap()
    }

    fn assert_bearer(request: &str) {
        assert!(
            request.to_ascii_lowercase().contains("authorization: bearer tok"),
            "missing bearer token in:\n{request}"
        );
    }

    #[test]
    fn download_reads_file_name_and_length_from_headers() {
        let (url, server) = serve_once(
            "200 OK",
            &[("Content-Disposition", r#"attachment; filename="r.txt""#)],
            b"hello",
        );

        let downloaded = local_client(&url).download_file("abc").unwrap();
        let request = server.join().unwrap();

        assert_eq!(downloaded.file_name, "r.txt");
        assert_eq!(downloaded.content_length, 5);
        assert_eq!(downloaded.body, b"hello");
        assert!(request.starts_with("POST /api/download "));
        assert!(request.contains(r#"{"file_id":"abc"}"#));
        assert_bearer(&request);
    }

    #[test]
    fn download_without_disposition_falls_back_to_file_id() {
        let (url, server) = serve_once("200 OK", &[], b"xyz");

        let downloaded = local_client(&url).download_file("id-7").unwrap();
        server.join().unwrap();

        assert_eq!(downloaded.file_name, "id-7");
        assert_eq!(downloaded.content_length, 3);
    }

    #[test]
    fn download_of_unknown_id_surfaces_server_code() {
        let (url, server) = serve_once(
            "404 Not Found",
            &[("Content-Type", "application/json")],
            br#"{"http_error_code":"FILE1","description":"File not found"}"#,
        );

        let res = local_client(&url).download_file("missing");
        let request = server.join().unwrap();

        match res {
            Err(Error::Api {
                action,
                code,
                description,
            }) => {
                assert_eq!(action, "Downloading file with ID missing");
                assert_eq!(code, "FILE1");
                assert_eq!(description, "File not found");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_bearer(&request);
    }

    #[test]
    fn upload_sends_ufile_part_with_original_name() {
        let temp = tempfile::TempDir::new().unwrap();
        let encrypted = temp.path().join("enc_signed_report.txt");
        std::fs::write(&encrypted, b"ciphertext bytes").unwrap();
        let (url, server) = serve_once(
            "200 OK",
            &[("Content-Type", "application/json")],
            br#"{"file_id":"f-9"}"#,
        );

        let res = local_client(&url).upload_file(&encrypted, "report.txt").unwrap();
        let request = server.join().unwrap();

        assert_eq!(res.file_id, "f-9");
        assert!(request.starts_with("POST /api/upload "));
        assert!(request.contains(r#"name="ufile""#));
        assert!(request.contains(r#"filename="report.txt""#));
        assert!(request.contains("ciphertext bytes"));
        assert_bearer(&request);
    }

    #[test]
    fn list_parses_listing() {
        let (url, server) = serve_once(
            "200 OK",
            &[("Content-Type", "application/json")],
            br#"{"num_files":1,"files_list":["id-1"]}"#,
        );

        let listing = local_client(&url).list_files().unwrap();
        let request = server.join().unwrap();

        assert_eq!(listing.num_files, 1);
        assert_eq!(listing.files_list[0].id(), "id-1");
        assert!(request.starts_with("POST /api/list "));
        assert_bearer(&request);
    }

    #[test]
    fn delete_sends_file_id() {
        let (url, server) = serve_once("200 OK", &[], b"");

        local_client(&url).delete_file("gone").unwrap();
        let request = server.join().unwrap();

        assert!(request.starts_with("POST /api/delete_file "));
        assert!(request.contains(r#"{"file_id":"gone"}"#));
        assert_bearer(&request);
    }

    #[test]
    fn delete_failure_without_json_body_uses_status() {
        let (url, server) = serve_once("401 Unauthorized", &[], b"bad token");

        let res = local_client(&url).delete_file("x");
        server.join().unwrap();

        match res {
            Err(Error::Api {
                code, description, ..
            }) => {
                assert_eq!(code, "401");
                assert_eq!(description, "bad token");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
