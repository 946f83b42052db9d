//! In-memory doubles for the dispatcher's collaborators, shared by the
//! notify and backup test modules.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::connection::{
    ConnectionDescriptor, ConnectionStore, EngineKind, StoreError,
};

use super::{
    CipherError, MailError, MailMessage, MailTransport, NotificationRecord, NotificationStore,
    SecretCipher, SettingsStore, SmtpConfig, UserNotificationSettings,
};

pub(crate) fn postgres_connection(owner: Uuid) -> ConnectionDescriptor {
    ConnectionDescriptor {
        id: "c1".to_string(),
        name: "orders db".to_string(),
        engine: EngineKind::Postgresql,
        host: "db1".to_string(),
        port: 5432,
        username: "u".to_string(),
        password: "p".to_string(),
        database: "orders".to_string(),
        ssl: false,
        owner: Some(owner),
        tunnel: None,
    }
}

/// Settings with every channel disabled.
pub(crate) fn settings_for(owner: Uuid) -> UserNotificationSettings {
    UserNotificationSettings {
        user_id: owner,
        notify_dashboard: false,
        notify_webhook: false,
        notify_email: false,
        webhook_url: None,
        email: None,
        smtp_host: None,
        smtp_port: None,
        smtp_username: None,
        smtp_password: None,
        env_configured: HashMap::new(),
    }
}

/// Email-enabled settings with a full SMTP block and no provenance flag.
pub(crate) fn smtp_settings(owner: Uuid) -> UserNotificationSettings {
    UserNotificationSettings {
        notify_email: true,
        email: Some("ops@example.com".to_string()),
        smtp_host: Some("smtp.example.com".to_string()),
        smtp_port: Some(587),
        smtp_username: Some("mailer".to_string()),
        smtp_password: Some("raw-pass".to_string()),
        ..settings_for(owner)
    }
}

pub(crate) struct MemoryConnectionStore {
    connections: HashMap<String, ConnectionDescriptor>,
}

impl MemoryConnectionStore {
    pub(crate) fn with(conn: ConnectionDescriptor) -> Self {
        let mut connections = HashMap::new();
        connections.insert(conn.id.clone(), conn);
        Self { connections }
    }
}

impl ConnectionStore for MemoryConnectionStore {
    fn get(&self, id: &str) -> Result<Option<ConnectionDescriptor>, StoreError> {
        Ok(self.connections.get(id).cloned())
    }
}

pub(crate) struct MemorySettingsStore {
    settings: HashMap<Uuid, UserNotificationSettings>,
}

impl MemorySettingsStore {
    pub(crate) fn with(settings: UserNotificationSettings) -> Self {
        let mut map = HashMap::new();
        map.insert(settings.user_id, settings);
        Self { settings: map }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserNotificationSettings>, StoreError> {
        Ok(self.settings.get(&user_id).cloned())
    }
}

pub(crate) struct RecordingNotificationStore {
    created: Mutex<Vec<NotificationRecord>>,
    fail: bool,
}

impl RecordingNotificationStore {
    pub(crate) fn new() -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub(crate) fn created(&self) -> Vec<NotificationRecord> {
        self.created.lock().unwrap().clone()
    }
}

impl NotificationStore for RecordingNotificationStore {
    fn create(&self, record: &NotificationRecord) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::new("insert failed"));
        }
        self.created.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Mail double. Signals on its channel after every accepted send so tests can
/// wait for the detached email thread without sleeping blind.
pub(crate) struct RecordingMailTransport {
    sent: Mutex<Vec<(SmtpConfig, MailMessage)>>,
    signal: Mutex<mpsc::Sender<()>>,
    fail: bool,
}

impl RecordingMailTransport {
    pub(crate) fn new() -> (Arc<Self>, mpsc::Receiver<()>) {
        Self::build(false)
    }

    pub(crate) fn failing() -> (Arc<Self>, mpsc::Receiver<()>) {
        Self::build(true)
    }

    fn build(fail: bool) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel();
        let transport = Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            signal: Mutex::new(tx),
            fail,
        });
        (transport, rx)
    }

    pub(crate) fn sent(&self) -> Vec<(SmtpConfig, MailMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

impl MailTransport for RecordingMailTransport {
    fn send(&self, config: &SmtpConfig, message: &MailMessage) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::new("smtp refused"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((config.clone(), message.clone()));
        let _ = self.signal.lock().unwrap().send(());
        Ok(())
    }
}

pub(crate) struct RecordingCipher {
    decrypted: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingCipher {
    pub(crate) fn new() -> Self {
        Self {
            decrypted: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            decrypted: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub(crate) fn decrypted(&self) -> Vec<String> {
        self.decrypted.lock().unwrap().clone()
    }
}

impl SecretCipher for RecordingCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        Ok(format!("enc({plaintext})"))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        self.decrypted.lock().unwrap().push(ciphertext.to_string());
        if self.fail {
            return Err(CipherError::new("bad key"));
        }
        Ok(format!("dec({ciphertext})"))
    }
}

/// One-shot HTTP sink. Accepts a single request, replies 200 and hands the
/// request body back through the join handle. Polls with a deadline so a
/// missing request fails the test instead of hanging it.
pub(crate) fn http_sink() -> (String, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    listener.set_nonblocking(true).unwrap();

    let handle = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut stream = loop {
            match listener.accept() {
                Ok((stream, _)) => break stream,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    assert!(Instant::now() < deadline, "no webhook request arrived");
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => panic!("accept failed: {e}"),
            }
        };
        stream.set_nonblocking(false).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let header_end = loop {
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "connection closed before headers were complete");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut content_length = 0usize;
        for line in headers.lines() {
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
        }
        while buf.len() < header_end + content_length {
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "connection closed before the body was complete");
            buf.extend_from_slice(&chunk[..n]);
        }

        stream
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .unwrap();
        let _ = stream.flush();

        String::from_utf8_lossy(&buf[header_end..header_end + content_length]).to_string()
    });

    (format!("http://{addr}/hooks/backup"), handle)
}
