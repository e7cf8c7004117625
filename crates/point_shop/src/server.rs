//! Line-oriented JSON-over-TCP backend server.
//!
//! The chat front end, the payment webhook gateway and the operator tooling
//! all speak this protocol: one JSON request per line, one JSON response per
//! line. Administrative requests carry the configured admin token: the
//! capability check lives here, at the boundary; the core operations trust
//! their caller.

use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::config::ShopConfig;
use crate::credit::{CreditPayload, CreditReceipt};
use crate::pending::FlushReport;
use crate::shop::{PointShop, PurchaseReceipt, TradeReceipt};
use crate::types::SessionId;
use crate::util::now_unix_ms;

pub const SHOP_PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct ShopServerConfig {
    pub bind_addr: String,
    pub admin_token: String,
}

impl ShopServerConfig {
    pub fn from_shop_config(config: &ShopConfig) -> Self {
        Self {
            bind_addr: config.bind_addr.clone(),
            admin_token: config.admin_token.clone(),
        }
    }

    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShopRequest {
    Hello {
        client: String,
    },
    Balance {
        player_id: String,
    },
    Credit {
        payload: CreditPayload,
    },
    RetryCredit {
        actor_id: String,
        payload: CreditPayload,
    },
    Trade {
        from_player_id: String,
        to: String,
        amount: i64,
    },
    BeginPurchase {
        player_id: String,
        item_name: String,
        price: i64,
        command_template: String,
    },
    ConfirmPurchase {
        session_id: SessionId,
        context: String,
    },
    FlushPending {
        token: String,
    },
    ResetRetryWindow {
        token: String,
        actor_id: String,
        subject_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShopResponse {
    HelloAck {
        server: String,
        version: u32,
    },
    Balance {
        player_id: String,
        points: i64,
    },
    Credited {
        receipt: CreditReceipt,
    },
    TradeCompleted {
        receipt: TradeReceipt,
    },
    PurchaseStarted {
        session_id: SessionId,
    },
    PurchaseCompleted {
        receipt: PurchaseReceipt,
    },
    FlushCompleted {
        report: FlushReport,
    },
    RetryWindowReset {
        actor_id: String,
        subject_id: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug)]
pub enum ShopServerError {
    Io(String),
    Serde(String),
}

impl From<io::Error> for ShopServerError {
    fn from(err: io::Error) -> Self {
        ShopServerError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ShopServerError {
    fn from(err: serde_json::Error) -> Self {
        ShopServerError::Serde(err.to_string())
    }
}

pub struct ShopServer {
    config: ShopServerConfig,
    shop: Arc<PointShop>,
}

impl ShopServer {
    pub fn new(config: ShopServerConfig, shop: Arc<PointShop>) -> Self {
        Self { config, shop }
    }

    pub fn run(&self) -> Result<(), ShopServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr)?;
        self.serve_listener(listener)
    }

    /// Accept loop, one thread per connection.
    pub fn serve_listener(&self, listener: TcpListener) -> Result<(), ShopServerError> {
        for incoming in listener.incoming() {
            let stream = incoming?;
            let shop = self.shop.clone();
            let config = self.config.clone();
            thread::spawn(move || {
                if let Err(err) = serve_connection(stream, &config, shop.as_ref()) {
                    eprintln!("shop server connection error: {err:?}");
                }
            });
        }
        Ok(())
    }

    /// Serve a single connection inline (tests and one-shot tooling).
    pub fn run_once(&self, listener: &TcpListener) -> Result<(), ShopServerError> {
        let (stream, _) = listener.accept()?;
        serve_connection(stream, &self.config, self.shop.as_ref())
    }
}

fn serve_connection(
    stream: TcpStream,
    config: &ShopServerConfig,
    shop: &PointShop,
) -> Result<(), ShopServerError> {
    stream.set_nodelay(true)?;
    let reader_stream = stream.try_clone()?;
    let mut writer = BufWriter::new(stream);
    let mut reader = BufReader::new(reader_stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(_) => break,
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ShopRequest>(trimmed) {
            Ok(request) => handle_request(request, config, shop),
            Err(err) => ShopResponse::Error {
                message: format!("malformed request: {err}"),
            },
        };
        send_response(&mut writer, &response)?;
    }
    Ok(())
}

fn handle_request(
    request: ShopRequest,
    config: &ShopServerConfig,
    shop: &PointShop,
) -> ShopResponse {
    let now_ms = now_unix_ms();
    let result = match request {
        ShopRequest::Hello { .. } => Ok(ShopResponse::HelloAck {
            server: "point_shop".to_string(),
            version: SHOP_PROTOCOL_VERSION,
        }),
        ShopRequest::Balance { player_id } => Ok(ShopResponse::Balance {
            points: shop.announce_balance(&player_id),
            player_id,
        }),
        ShopRequest::Credit { payload } => shop
            .credit(&payload, now_ms)
            .map(|receipt| ShopResponse::Credited { receipt }),
        ShopRequest::RetryCredit { actor_id, payload } => shop
            .retry_credit(&actor_id, &payload, now_ms)
            .map(|receipt| ShopResponse::Credited { receipt }),
        ShopRequest::Trade {
            from_player_id,
            to,
            amount,
        } => shop
            .trade(&from_player_id, &to, amount, now_ms)
            .map(|receipt| ShopResponse::TradeCompleted { receipt }),
        ShopRequest::BeginPurchase {
            player_id,
            item_name,
            price,
            command_template,
        } => shop
            .begin_purchase(&player_id, &item_name, price, &command_template, now_ms)
            .map(|session_id| ShopResponse::PurchaseStarted { session_id }),
        ShopRequest::ConfirmPurchase {
            session_id,
            context,
        } => shop
            .confirm_purchase(session_id, &context, now_ms)
            .map(|receipt| ShopResponse::PurchaseCompleted { receipt }),
        ShopRequest::FlushPending { token } => {
            if !admin_authorized(config, &token) {
                return unauthorized();
            }
            shop.flush_pending()
                .map(|report| ShopResponse::FlushCompleted { report })
        }
        ShopRequest::ResetRetryWindow {
            token,
            actor_id,
            subject_id,
        } => {
            if !admin_authorized(config, &token) {
                return unauthorized();
            }
            shop.reset_retry_window(&actor_id, &subject_id)
                .map(|_| ShopResponse::RetryWindowReset {
                    actor_id,
                    subject_id,
                })
        }
    };
    result.unwrap_or_else(|err| ShopResponse::Error {
        message: format!("{err:?}"),
    })
}

fn admin_authorized(config: &ShopServerConfig, token: &str) -> bool {
    !config.admin_token.is_empty() && config.admin_token == token
}

fn unauthorized() -> ShopResponse {
    ShopResponse::Error {
        message: "unauthorized: bad or missing admin token".to_string(),
    }
}

fn send_response(
    writer: &mut BufWriter<TcpStream>,
    response: &ShopResponse,
) -> Result<(), ShopServerError> {
    serde_json::to_writer(&mut *writer, response)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::{shop_with_channel, ScriptedChannel};
    use std::net::SocketAddr;

    fn start_server(shop: Arc<PointShop>, admin_token: &str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        let addr = listener.local_addr().expect("listener local addr");
        let server = ShopServer::new(
            ShopServerConfig {
                bind_addr: addr.to_string(),
                admin_token: admin_token.to_string(),
            },
            shop,
        );
        thread::spawn(move || {
            let _ = server.serve_listener(listener);
        });
        addr
    }

    fn round_trip(addr: SocketAddr, requests: &[ShopRequest]) -> Vec<ShopResponse> {
        let stream = TcpStream::connect(addr).expect("connect test client");
        let mut writer = BufWriter::new(stream.try_clone().expect("clone stream"));
        let mut reader = BufReader::new(stream);
        let mut responses = Vec::new();
        for request in requests {
            serde_json::to_writer(&mut writer, request).expect("write request");
            writer.write_all(b"\n").expect("write newline");
            writer.flush().expect("flush");
            let mut line = String::new();
            reader.read_line(&mut line).expect("read response");
            responses.push(serde_json::from_str(line.trim()).expect("parse response"));
        }
        responses
    }

    #[test]
    fn request_wire_format_is_stable() {
        let json = serde_json::to_string(&ShopRequest::Balance {
            player_id: "eos-1".to_string(),
        })
        .expect("serialize");
        assert_eq!(json, r#"{"type":"balance","player_id":"eos-1"}"#);
    }

    #[test]
    fn credit_then_balance_over_the_wire() {
        let (shop, _channel) = shop_with_channel(ScriptedChannel::healthy());
        let addr = start_server(Arc::new(shop), "");
        let responses = round_trip(
            addr,
            &[
                ShopRequest::Credit {
                    payload: CreditPayload {
                        eos_id: Some("eos-1".to_string()),
                        points: 40,
                        ..CreditPayload::default()
                    },
                },
                ShopRequest::Balance {
                    player_id: "eos-1".to_string(),
                },
            ],
        );
        match &responses[0] {
            ShopResponse::Credited { receipt } => {
                assert_eq!(receipt.new_balance, 40);
            }
            other => panic!("unexpected response: {other:?}"),
        }
        assert_eq!(
            responses[1],
            ShopResponse::Balance {
                player_id: "eos-1".to_string(),
                points: 40,
            }
        );
    }

    #[test]
    fn invalid_credit_is_rejected_over_the_wire() {
        let (shop, _channel) = shop_with_channel(ScriptedChannel::healthy());
        let addr = start_server(Arc::new(shop), "");
        let responses = round_trip(
            addr,
            &[ShopRequest::Credit {
                payload: CreditPayload {
                    eos_id: Some("eos-1".to_string()),
                    points: 0,
                    ..CreditPayload::default()
                },
            }],
        );
        assert!(matches!(responses[0], ShopResponse::Error { .. }));
    }

    #[test]
    fn admin_requests_require_the_configured_token() {
        let (shop, _channel) = shop_with_channel(ScriptedChannel::healthy());
        let addr = start_server(Arc::new(shop), "top-secret");
        let responses = round_trip(
            addr,
            &[
                ShopRequest::FlushPending {
                    token: "wrong".to_string(),
                },
                ShopRequest::FlushPending {
                    token: "top-secret".to_string(),
                },
            ],
        );
        assert!(matches!(responses[0], ShopResponse::Error { .. }));
        assert_eq!(
            responses[1],
            ShopResponse::FlushCompleted {
                report: FlushReport {
                    attempted: 0,
                    delivered: 0,
                },
            }
        );
    }

    #[test]
    fn empty_admin_token_refuses_admin_requests() {
        let (shop, _channel) = shop_with_channel(ScriptedChannel::healthy());
        let addr = start_server(Arc::new(shop), "");
        let responses = round_trip(
            addr,
            &[ShopRequest::ResetRetryWindow {
                token: String::new(),
                actor_id: "admin".to_string(),
                subject_id: "eos-1".to_string(),
            }],
        );
        assert!(matches!(responses[0], ShopResponse::Error { .. }));
    }

    #[test]
    fn malformed_lines_get_an_error_response() {
        let (shop, _channel) = shop_with_channel(ScriptedChannel::healthy());
        let addr = start_server(Arc::new(shop), "");
        let stream = TcpStream::connect(addr).expect("connect test client");
        let mut writer = BufWriter::new(stream.try_clone().expect("clone stream"));
        let mut reader = BufReader::new(stream);
        writer.write_all(b"not json\n").expect("write");
        writer.flush().expect("flush");
        let mut line = String::new();
        reader.read_line(&mut line).expect("read response");
        let response: ShopResponse = serde_json::from_str(line.trim()).expect("parse response");
        assert!(matches!(response, ShopResponse::Error { .. }));
    }
}
