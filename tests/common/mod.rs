//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use futures_util::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use resilient_call::resilience::{CircuitState, FailureInfo, PolicyObserver};
use resilient_call::{DownstreamResponse, RequestDescriptor, Transport, TransportFault};

/// Start a programmable mock backend with async support.
pub async fn start_programmable_backend<F, Fut>(addr: SocketAddr, f: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        read_request_head(&mut socket).await;
                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

async fn read_request_head(socket: &mut tokio::net::TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

/// One scripted attempt result.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Status(u16),
    Refused,
    /// Never completes.
    Hang,
    /// Waits for `ScriptedTransport::release`, then answers with the status.
    Gated(u16),
}

/// In-memory transport that plays back a script, then repeats a fallback.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: AtomicU32,
    gate: Semaphore,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: Step::Status(200),
            calls: AtomicU32::new(0),
            gate: Semaphore::new(0),
        }
    }

    pub fn always(step: Step) -> Self {
        Self::new([]).then(step)
    }

    /// Step to repeat once the script runs out.
    pub fn then(mut self, step: Step) -> Self {
        self.fallback = step;
        self
    }

    pub fn push(&self, step: Step) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

impl Transport for ScriptedTransport {
    fn invoke<'a>(
        &'a self,
        _request: &'a RequestDescriptor,
    ) -> BoxFuture<'a, Result<DownstreamResponse, TransportFault>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front().unwrap_or(self.fallback);

        Box::pin(async move {
            match step {
                Step::Status(code) => Ok(response(code)),
                Step::Refused => Err(TransportFault::Connect("connection refused".into())),
                Step::Hang => std::future::pending().await,
                Step::Gated(code) => {
                    let permit = self.gate.acquire().await.unwrap();
                    permit.forget();
                    Ok(response(code))
                }
            }
        })
    }
}

fn response(code: u16) -> DownstreamResponse {
    DownstreamResponse::new(StatusCode::from_u16(code).unwrap(), format!("status {}", code))
}

/// Observer event, flattened for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Opened(CircuitState, FailureInfo),
    HalfOpen,
    Closed,
    Retry(u32, Duration),
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl PolicyObserver for RecordingObserver {
    fn on_circuit_opened(&self, _downstream: &str, previous: CircuitState, failure: &FailureInfo) {
        self.events.lock().unwrap().push(Event::Opened(previous, failure.clone()));
    }

    fn on_circuit_closed(&self, _downstream: &str) {
        self.events.lock().unwrap().push(Event::Closed);
    }

    fn on_circuit_half_open(&self, _downstream: &str) {
        self.events.lock().unwrap().push(Event::HalfOpen);
    }

    fn on_retry_attempt(&self, _downstream: &str, attempt: u32, delay: Duration, _last_failure: &FailureInfo) {
        self.events.lock().unwrap().push(Event::Retry(attempt, delay));
    }
}
