#![allow(dead_code)]

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use xo_templates::models::{
    Architecture, BootOrder, DiskAttachParams, SourceSpec, TargetSpec, TemplateRecord, TemplateSpec,
    VmCreateParams,
};
use xo_templates::progress::ProgressSink;
use xo_templates::{Config, Error, Hypervisor, Result};
use xo_templates::image::ImageProvider;

pub fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("xo-templates-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn debian_spec(target: &str) -> TemplateSpec {
    TemplateSpec {
        source: SourceSpec {
            distribution: "debian".to_string(),
            architecture: Architecture::Amd64,
            version: "12".to_string(),
            variant: "genericcloud".to_string(),
            base_template: "Debian Bookworm 12".to_string(),
        },
        target: TargetSpec {
            name: target.to_string(),
            cpu: 2,
            memory: 4,
            network: "Pool-wide network".to_string(),
            sr: "Local storage".to_string(),
        },
    }
}

pub fn template(id: &str, name_label: &str) -> TemplateRecord {
    TemplateRecord {
        id: id.to_string(),
        name_label: name_label.to_string(),
        ..Default::default()
    }
}

/// Counts pipelines between entering and leaving, remembering the peak.
#[derive(Default)]
pub struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// In-memory pool. Converted VMs show up in `list_templates`.
#[derive(Default)]
pub struct FakeHypervisor {
    pub missing: Mutex<HashSet<String>>,
    pub templates: Mutex<BTreeMap<String, TemplateRecord>>,
    pub refuse: Mutex<HashSet<&'static str>>,
    pub fail_delete: Mutex<HashSet<String>>,
    pub fail_list: Mutex<bool>,
    pub created: Mutex<Vec<VmCreateParams>>,
    pub attached: Mutex<Vec<DiskAttachParams>>,
    pub boot_orders: Mutex<Vec<(String, String)>>,
    pub uploads: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    pub upload_delay: Duration,
    gauge: Option<Arc<Gauge>>,
    vms: Mutex<BTreeMap<String, String>>,
    counter: AtomicUsize,
}

impl FakeHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_templates(self, records: Vec<TemplateRecord>) -> Self {
        {
            let mut templates = self.templates.lock().unwrap();
            for record in records {
                templates.insert(record.id.clone(), record);
            }
        }
        self
    }

    pub fn missing(self, name: &str) -> Self {
        self.missing.lock().unwrap().insert(name.to_string());
        self
    }

    pub fn refusing(self, method: &'static str) -> Self {
        self.refuse.lock().unwrap().insert(method);
        self
    }

    pub fn failing_delete(self, id: &str) -> Self {
        self.fail_delete.lock().unwrap().insert(id.to_string());
        self
    }

    pub fn upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = delay;
        self
    }

    /// Leaves `gauge` when the cleanup stage lists templates.
    pub fn gauge(mut self, gauge: Arc<Gauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    fn lookup(&self, prefix: &str, kind: &'static str, name: &str) -> Result<String> {
        if self.missing.lock().unwrap().contains(name) {
            return Err(Error::ResourceNotFound {
                kind,
                name: name.to_string(),
            });
        }
        Ok(format!("{}-{}", prefix, name.replace(' ', "-").to_lowercase()))
    }

    fn accepts(&self, method: &'static str) -> bool {
        !self.refuse.lock().unwrap().contains(method)
    }
}

#[async_trait]
impl Hypervisor for FakeHypervisor {
    async fn find_storage_repository_id(&self, name: &str) -> Result<String> {
        self.lookup("sr", "Storage repository", name)
    }

    async fn find_template_id(&self, name: &str) -> Result<String> {
        self.lookup("tpl", "Template", name)
    }

    async fn find_network_id(&self, name: &str) -> Result<String> {
        self.lookup("net", "Network", name)
    }

    async fn import_disk(
        &self,
        sr_id: &str,
        _path: &Path,
        upload_name: &str,
        progress: &ProgressSink,
    ) -> Result<String> {
        progress.report(0.25);
        tokio::time::sleep(self.upload_delay).await;
        progress.report(0.75);
        progress.report(1.0);
        self.uploads.lock().unwrap().push(upload_name.to_string());
        Ok(format!("vdi-{}-{}", sr_id, upload_name))
    }

    async fn create_vm(&self, params: &VmCreateParams) -> Result<String> {
        let id = format!("vm-{}", self.counter.fetch_add(1, Ordering::SeqCst));
        self.created.lock().unwrap().push(params.clone());
        self.vms
            .lock()
            .unwrap()
            .insert(id.clone(), params.name_label.clone());
        Ok(id)
    }

    async fn attach_disk(&self, params: &DiskAttachParams) -> Result<bool> {
        self.attached.lock().unwrap().push(params.clone());
        Ok(self.accepts("vm.attachDisk"))
    }

    async fn set_boot_order(&self, vm_id: &str, order: &BootOrder) -> Result<bool> {
        self.boot_orders
            .lock()
            .unwrap()
            .push((vm_id.to_string(), order.to_string()));
        Ok(self.accepts("vm.setBootOrder"))
    }

    async fn convert_vm_to_template(&self, vm_id: &str) -> Result<bool> {
        if !self.accepts("vm.convertToTemplate") {
            return Ok(false);
        }
        let name = self.vms.lock().unwrap().remove(vm_id).unwrap_or_default();
        self.templates
            .lock()
            .unwrap()
            .insert(vm_id.to_string(), template(vm_id, &name));
        Ok(true)
    }

    async fn list_templates(&self) -> Result<BTreeMap<String, TemplateRecord>> {
        if let Some(gauge) = &self.gauge {
            gauge.leave();
        }
        if *self.fail_list.lock().unwrap() {
            return Err(Error::ConnectionClosed);
        }
        Ok(self.templates.lock().unwrap().clone())
    }

    async fn delete_template(&self, id: &str) -> Result<bool> {
        if self.fail_delete.lock().unwrap().contains(id) {
            return Err(Error::Rpc {
                code: -32000,
                message: "VM is in use".to_string(),
            });
        }
        self.deleted.lock().unwrap().push(id.to_string());
        Ok(self.templates.lock().unwrap().remove(id).is_some())
    }
}

/// Provider that hands back a fixed path after an optional delay.
pub struct FakeProvider {
    pub path: PathBuf,
    pub delay: Duration,
    pub fail_for: HashSet<String>,
    gauge: Option<Arc<Gauge>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from("/var/cache/xo-templates/debian-12-genericcloud-amd64.vmdk"),
            delay: Duration::ZERO,
            fail_for: HashSet::new(),
            gauge: None,
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Enters `gauge` at the start of every fetch.
    pub fn gauge(mut self, gauge: Arc<Gauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    /// Fails fetches whose base template is `name`.
    pub fn failing_for(mut self, name: &str) -> Self {
        self.fail_for.insert(name.to_string());
        self
    }
}

#[async_trait]
impl ImageProvider for FakeProvider {
    fn cache_path(&self, _source: &SourceSpec) -> Result<PathBuf> {
        Ok(self.path.clone())
    }

    async fn fetch(&self, source: &SourceSpec, _use_cache: bool, progress: &ProgressSink) -> Result<PathBuf> {
        if let Some(gauge) = &self.gauge {
            gauge.enter();
        }

        progress.report(0.5);
        tokio::time::sleep(self.delay).await;

        if self.fail_for.contains(&source.base_template) {
            return Err(Error::ImageUnavailable {
                url: "https://images.invalid".to_string(),
                reason: "HTTP 404".to_string(),
            });
        }
        progress.report(1.0);
        Ok(self.path.clone())
    }
}

pub enum RpcReply {
    Result(Value),
    Error { code: i64, message: String },
    Delayed(Duration, Box<RpcReply>),
    Silent,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

type RpcHandler = Arc<dyn Fn(&str, &Value) -> RpcReply + Send + Sync>;
type HttpHandler = Arc<dyn Fn(&HttpRequest) -> HttpReply + Send + Sync>;

/// Loopback Xen Orchestra: JSON-RPC over WebSocket and plain HTTP on the
/// same port.
pub struct MockXo {
    pub addr: SocketAddr,
    pub calls: Arc<Mutex<Vec<(String, Value)>>>,
    pub requests: Arc<Mutex<Vec<HttpRequest>>>,
    pub closes: Arc<AtomicUsize>,
}

impl MockXo {
    pub async fn start(
        rpc: impl Fn(&str, &Value) -> RpcReply + Send + Sync + 'static,
        http: impl Fn(&HttpRequest) -> HttpReply + Send + Sync + 'static,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let rpc: RpcHandler = Arc::new(rpc);
        let http: HttpHandler = Arc::new(http);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let closes = Arc::new(AtomicUsize::new(0));

        {
            let calls = calls.clone();
            let requests = requests.clone();
            let closes = closes.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let rpc = rpc.clone();
                    let http = http.clone();
                    let calls = calls.clone();
                    let requests = requests.clone();
                    let closes = closes.clone();
                    tokio::spawn(async move {
                        let head = match peek_head(&stream).await {
                            Ok(head) => head,
                            Err(_) => return,
                        };
                        if head.to_lowercase().contains("upgrade: websocket") {
                            serve_rpc(stream, rpc, calls, closes).await;
                        } else {
                            let _ = serve_http(stream, http, requests).await;
                        }
                    });
                }
            });
        }

        Self {
            addr,
            calls,
            requests,
            closes,
        }
    }

    /// Signs everyone in and answers nothing else.
    pub async fn rpc_only(rpc: impl Fn(&str, &Value) -> RpcReply + Send + Sync + 'static) -> Self {
        Self::start(rpc, |_| HttpReply::new(404, "not found")).await
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn config(&self) -> Config {
        Config::with_credentials(self.ws_url(), "secret-token").timeout_seconds(5)
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(method, _)| method.clone())
            .collect()
    }
}

async fn peek_head(stream: &TcpStream) -> std::io::Result<String> {
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        let n = stream.peek(&mut buf).await?;
        let text = String::from_utf8_lossy(&buf[..n]).to_string();
        if n == 0 || n == buf.len() || text.contains("\r\n\r\n") {
            return Ok(text);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn serve_rpc(
    stream: TcpStream,
    handler: RpcHandler,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
    closes: Arc<AtomicUsize>,
) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = source.next().await {
        match message {
            Message::Text(text) => {
                let request: Value = match serde_json::from_str(&text) {
                    Ok(request) => request,
                    Err(_) => continue,
                };
                let id = request["id"].clone();
                let method = request["method"].as_str().unwrap_or_default().to_string();
                let params = request["params"].clone();
                calls.lock().unwrap().push((method.clone(), params.clone()));

                let reply = handler(&method, &params);
                tokio::spawn(send_reply(tx.clone(), id, reply));
            }
            Message::Close(_) => {
                closes.fetch_add(1, Ordering::SeqCst);
                break;
            }
            _ => {}
        }
    }
}

async fn send_reply(tx: mpsc::UnboundedSender<Message>, id: Value, mut reply: RpcReply) {
    loop {
        match reply {
            RpcReply::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
            RpcReply::Result(result) => {
                let body = json!({ "jsonrpc": "2.0", "id": id, "result": result });
                let _ = tx.send(Message::Text(body.to_string()));
                return;
            }
            RpcReply::Error { code, message } => {
                let body = json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": code, "message": message }
                });
                let _ = tx.send(Message::Text(body.to_string()));
                return;
            }
            RpcReply::Silent => return,
        }
    }
}

async fn serve_http(
    mut stream: TcpStream,
    handler: HttpHandler,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
) -> std::io::Result<()> {
    let mut data = Vec::new();
    let mut chunk = vec![0u8; 16 * 1024];

    let head_end = loop {
        if let Some(pos) = find(&data, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        data.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&data[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_lowercase(), value.trim().to_string()))
        .collect();

    let mut request = HttpRequest {
        method,
        target,
        headers,
        body: data[head_end..].to_vec(),
    };

    if let Some(length) = request
        .header("content-length")
        .and_then(|v| v.parse::<usize>().ok())
    {
        while request.body.len() < length {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            request.body.extend_from_slice(&chunk[..n]);
        }
        request.body.truncate(length);
    } else if request.header("transfer-encoding") == Some("chunked") {
        while !request.body.ends_with(b"0\r\n\r\n") {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            request.body.extend_from_slice(&chunk[..n]);
        }
        request.body = decode_chunked(&request.body);
    }

    requests.lock().unwrap().push(request.clone());
    let reply = handler(&request);

    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\n",
        reply.status,
        reason(reply.status),
        reply.body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&reply.body).await?;
    stream.shutdown().await
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn decode_chunked(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut rest = raw;
    while let Some(pos) = find(rest, b"\r\n") {
        let size_line = String::from_utf8_lossy(&rest[..pos]).to_string();
        let size = usize::from_str_radix(size_line.split(';').next().unwrap_or("0").trim(), 16).unwrap_or(0);
        rest = &rest[pos + 2..];
        if size == 0 {
            break;
        }
        let end = size.min(rest.len());
        out.extend_from_slice(&rest[..end]);
        rest = &rest[(size + 2).min(rest.len())..];
    }
    out
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
