//! Shared test infrastructure for integration tests.
//!
//! Provides a canned AMP inventory over HTTP, a stub `knife` script and a
//! config file wiring them together, so the release binary can be driven end
//! to end without a Chef server.
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::{Arc, Mutex};
use std::thread;
use tempfile::TempDir;

/// A request body the stub inventory received via POST.
#[derive(Debug, Clone)]
pub struct Posted {
    pub path: String,
    pub body: Value,
}

/// Minimal HTTP/1.1 inventory serving canned JSON documents by path.
pub struct StubInventory {
    url: String,
    posted: Arc<Mutex<Vec<Posted>>>,
}

impl StubInventory {
    pub fn start(documents: BTreeMap<String, Value>) -> Self {
        Self::start_with_post_status(documents, "201 Created")
    }

    /// Like [`StubInventory::start`], but answer every POST with `post_status`.
    pub fn start_with_post_status(
        documents: BTreeMap<String, Value>,
        post_status: &'static str,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub inventory");
        let url = format!("http://{}", listener.local_addr().expect("local addr"));
        let posted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&posted);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let _ = serve(stream, &documents, &sink, post_status);
            }
        });
        Self { url, posted }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn posted(&self) -> Vec<Posted> {
        self.posted.lock().expect("posted lock").clone()
    }
}

fn serve(
    stream: TcpStream,
    documents: &BTreeMap<String, Value>,
    posted: &Mutex<Vec<Posted>>,
    post_status: &str,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    let mut chunked = false;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header)?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            } else if name.eq_ignore_ascii_case("transfer-encoding") {
                chunked = value.trim().eq_ignore_ascii_case("chunked");
            }
        }
    }
    let body = if chunked {
        read_chunked(&mut reader)?
    } else {
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body)?;
        body
    };

    let (status, payload) = match method.as_str() {
        "GET" => match documents.get(&path) {
            Some(doc) => ("200 OK", doc.to_string()),
            None => ("404 Not Found", json!({"error": "not found"}).to_string()),
        },
        "POST" => {
            let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
            posted.lock().expect("posted lock").push(Posted {
                path: path.clone(),
                body,
            });
            (post_status, "{}".to_string())
        }
        _ => ("405 Method Not Allowed", "{}".to_string()),
    };
    let mut stream = stream;
    write!(
        stream,
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    )?;
    stream.flush()
}

fn read_chunked(reader: &mut impl BufRead) -> std::io::Result<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let mut size_line = String::new();
        reader.read_line(&mut size_line)?;
        let size_hex = size_line.trim().split(';').next().unwrap_or_default();
        let size = usize::from_str_radix(size_hex, 16).unwrap_or(0);
        if size == 0 {
            let mut trailer = String::new();
            reader.read_line(&mut trailer)?;
            return Ok(body);
        }
        let start = body.len();
        body.resize(start + size, 0);
        reader.read_exact(&mut body[start..])?;
        let mut crlf = String::new();
        reader.read_line(&mut crlf)?;
    }
}

/// The canned inventory used by the lock tests.
pub fn shop_documents() -> BTreeMap<String, Value> {
    let shop = json!({
        "name": "shop",
        "version": "2.1",
        "roles": {"app": {"count": 2}},
        "steps": [
            {"role": "app", "package": "foo-1.0"},
            {"role": "base", "package": "ntp-4.2"},
            {"role": "worker", "package": "foo-1.0"}
        ],
        "app_steps": [
            {"name": "seed db", "command": "chef-client -o 'recipe[shop::seed]'"}
        ],
        "options": {},
        "metadata": {"owner": "paas"}
    });
    BTreeMap::from([
        ("/appliances".to_string(), json!([
            {"name": "shop", "version": "2.1", "uri": "/appliances/shop-2.1"}
        ])),
        ("/appliances/shop-2.1".to_string(), shop),
        ("/packages/foo-1.0".to_string(), json!({
            "name": "foo",
            "version": "1.0",
            "command": "chef-client -o 'role[foo]' -E prod-env",
            "os": "linux",
            "metadata": {}
        })),
        ("/packages/ntp-4.2".to_string(), json!({
            "name": "ntp",
            "version": "4.2",
            "command": "apt-get install -y ntp",
            "os": "linux",
            "metadata": {}
        })),
    ])
}

/// Temp workspace holding the stub knife, config and environments dir.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new(inventory_url: &str) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let knife = write_stub_knife(dir.path());
        let knife_command = format!("sh {}", shell_words::quote(&knife.to_string_lossy()));
        let config = json!({
            "schema_version": 1,
            "inventory_url": inventory_url,
            "knife_command": knife_command,
            "environments_dir": dir.path().join("environments"),
            "first_party_cookbooks": ["uc-base"],
            "classify_policy": "exact",
            "automation_marker": "chef",
            "throttle_ms": 0,
            "timeout_ms": 5000
        });
        std::fs::write(dir.path().join("config.json"), config.to_string()).expect("write config");
        Self { dir }
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.json")
    }

    pub fn environment_path(&self, name: &str) -> PathBuf {
        self.dir.path().join("environments").join(format!("{name}.json"))
    }

    pub fn read_environment(&self, name: &str) -> Value {
        let text = std::fs::read_to_string(self.environment_path(name)).expect("read environment");
        serde_json::from_str(&text).expect("parse environment")
    }

    /// Run the binary with this workspace's config.
    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_amp-lock"))
            .arg("--config")
            .arg(self.config_path())
            .args(args)
            .env_remove("AMP_LOCK_INVENTORY_URL")
            .env_remove("AMP_LOCK_KNIFE_COMMAND")
            .env_remove("RUST_LOG")
            .output()
            .expect("run amp-lock")
    }
}

/// Stub knife script; the config runs it through `sh`.
fn write_stub_knife(dir: &Path) -> PathBuf {
    let path = dir.join("knife");
    let script = r#"case "$1" in
  solve)
    printf 'Solving run list...\nuc-base 1.0.0\nnginx 12.0.0\nDone.\n'
    ;;
  environment)
    printf '{"name": "%s", "description": "Production", "cookbook_versions": {"nginx": "~> 12.0"}, "json_class": "Chef::Environment", "chef_type": "environment", "default_attributes": {"tier": "prod"}, "override_attributes": {}}\n' "$3"
    ;;
  *)
    echo "unexpected knife call: $*" >&2
    exit 1
    ;;
esac
"#;
    std::fs::write(&path, script).expect("write stub knife");
    path
}
