//! Mock SMTP relay for exercising the submission channel
//!
//! Supports scripting each stage's reply (greeting, EHLO, AUTH, MAIL,
//! RCPT, DATA), recording received commands for verification, and
//! hanging on a chosen command to test deadline handling.

#![allow(dead_code)]

use std::{
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayCommand {
    Ehlo(String),
    Auth(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    MessageContent(String),
    Quit,
    Other(String),
}

#[derive(Debug, Clone)]
struct ScriptedReply {
    code: u16,
    message: String,
}

impl ScriptedReply {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct MockRelayConfig {
    greeting: ScriptedReply,
    ehlo_capabilities: Vec<String>,
    auth_response: ScriptedReply,
    mail_from_response: ScriptedReply,
    rcpt_to_response: ScriptedReply,
    data_response: ScriptedReply,
    data_end_response: ScriptedReply,
    hang_on_command: Option<usize>,
}

impl Default for MockRelayConfig {
    fn default() -> Self {
        Self {
            greeting: ScriptedReply::new(220, "mock relay ready"),
            ehlo_capabilities: vec!["mock.relay".to_string(), "AUTH PLAIN".to_string()],
            auth_response: ScriptedReply::new(235, "Authentication successful"),
            mail_from_response: ScriptedReply::new(250, "OK"),
            rcpt_to_response: ScriptedReply::new(250, "OK"),
            data_response: ScriptedReply::new(354, "End data with <CRLF>.<CRLF>"),
            data_end_response: ScriptedReply::new(250, "OK: queued as 12345"),
            hang_on_command: None,
        }
    }
}

pub struct MockRelay {
    addr: SocketAddr,
    commands: Arc<RwLock<Vec<RelayCommand>>>,
    shutdown: Arc<AtomicBool>,
}

impl MockRelay {
    #[must_use]
    pub fn builder() -> MockRelayBuilder {
        MockRelayBuilder {
            config: MockRelayConfig::default(),
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn commands(&self) -> Vec<RelayCommand> {
        self.commands.read().await.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockRelayConfig>,
        commands: Arc<RwLock<Vec<RelayCommand>>>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut command_index = 0usize;

        writer.write_all(&config.greeting.to_bytes()).await?;
        writer.flush().await?;

        loop {
            line.clear();

            if config.hang_on_command == Some(command_index) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(());
            }

            let read = timeout(Duration::from_secs(10), reader.read_line(&mut line)).await;
            let Ok(Ok(bytes)) = read else {
                return Ok(());
            };
            if bytes == 0 {
                return Ok(());
            }

            command_index += 1;

            let cmd_line = line.trim();
            let parts: Vec<&str> = cmd_line.splitn(2, ' ').collect();
            let verb = parts[0].to_uppercase();

            let (response, command) = match verb.as_str() {
                "EHLO" => {
                    let mut response = String::new();
                    let count = config.ehlo_capabilities.len();
                    for (i, cap) in config.ehlo_capabilities.iter().enumerate() {
                        let sep = if i + 1 < count { '-' } else { ' ' };
                        let _ = write!(&mut response, "250{sep}{cap}\r\n");
                    }
                    (
                        response.into_bytes(),
                        RelayCommand::Ehlo(parts.get(1).unwrap_or(&"").to_string()),
                    )
                }
                "AUTH" => (
                    config.auth_response.to_bytes(),
                    RelayCommand::Auth(parts.get(1).unwrap_or(&"").to_string()),
                ),
                "MAIL" => (
                    config.mail_from_response.to_bytes(),
                    RelayCommand::MailFrom(parts.get(1).unwrap_or(&"").to_string()),
                ),
                "RCPT" => (
                    config.rcpt_to_response.to_bytes(),
                    RelayCommand::RcptTo(parts.get(1).unwrap_or(&"").to_string()),
                ),
                "DATA" => (config.data_response.to_bytes(), RelayCommand::Data),
                "QUIT" => {
                    commands.write().await.push(RelayCommand::Quit);
                    writer.write_all(b"221 Bye\r\n").await?;
                    writer.flush().await?;
                    return Ok(());
                }
                _ => (
                    ScriptedReply::new(500, "Unknown command").to_bytes(),
                    RelayCommand::Other(cmd_line.to_string()),
                ),
            };

            commands.write().await.push(command.clone());

            if matches!(command, RelayCommand::Data) && config.data_response.code == 354 {
                writer.write_all(&response).await?;
                writer.flush().await?;

                // Consume message content up to the lone dot
                let mut content = String::new();
                loop {
                    line.clear();
                    let bytes = reader.read_line(&mut line).await?;
                    if bytes == 0 {
                        return Ok(());
                    }
                    if line.trim_end() == "." {
                        commands
                            .write()
                            .await
                            .push(RelayCommand::MessageContent(content.clone()));
                        writer.write_all(&config.data_end_response.to_bytes()).await?;
                        writer.flush().await?;
                        break;
                    }
                    content.push_str(&line);
                }
                continue;
            }

            writer.write_all(&response).await?;
            writer.flush().await?;
        }
    }
}

pub struct MockRelayBuilder {
    config: MockRelayConfig,
}

impl MockRelayBuilder {
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = ScriptedReply::new(code, message);
        self
    }

    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_response = ScriptedReply::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = ScriptedReply::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = ScriptedReply::new(code, message);
        self
    }

    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = ScriptedReply::new(code, message);
        self
    }

    /// Hang forever on the Nth command (0-indexed, EHLO is 0).
    #[must_use]
    pub const fn with_hang_on_command(mut self, index: usize) -> Self {
        self.config.hang_on_command = Some(index);
        self
    }

    pub async fn build(self) -> Result<MockRelay, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let shutdown_flag = Arc::clone(&shutdown);
        let config_handle = Arc::clone(&config);
        let commands_handle = Arc::clone(&commands);

        tokio::spawn(async move {
            loop {
                if shutdown_flag.load(Ordering::Relaxed) {
                    break;
                }

                let accepted = timeout(Duration::from_millis(100), listener.accept()).await;
                if let Ok(Ok((stream, _peer))) = accepted {
                    let config = Arc::clone(&config_handle);
                    let commands = Arc::clone(&commands_handle);
                    tokio::spawn(async move {
                        let _ = MockRelay::handle_client(stream, config, commands).await;
                    });
                }
            }
        });

        Ok(MockRelay {
            addr,
            commands,
            shutdown,
        })
    }
}
