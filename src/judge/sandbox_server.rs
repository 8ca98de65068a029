use crate::error::SandboxError;
use crate::judge::judge_remote::{RUN_PATH, RunRequest, RunResponse};
use crate::judge::sandbox::Sandbox;
use log::{debug, error, warn};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const MAX_BODY_BYTES: usize = 1_000_000;
const MAX_LINE_BYTES: u64 = 8 * 1024;
const MAX_HEADERS: usize = 64;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct Request {
    method: String,
    path: String,
    content_type: Option<String>,
    body: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq)]
struct Response {
    status: u16,
    content_type: &'static str,
    body: String,
}

impl Response {
    fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
        }
    }

    fn json(body: &RunResponse) -> Self {
        match serde_json::to_string(body) {
            Ok(body) => Self {
                status: 200,
                content_type: "application/json",
                body,
            },
            Err(err) => Self::text(500, format!("error serializando respuesta: {err}")),
        }
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            204 => "No Content",
            400 => "Bad Request",
            404 => "Not Found",
            415 => "Unsupported Media Type",
            502 => "Bad Gateway",
            504 => "Gateway Timeout",
            _ => "Internal Server Error",
        }
    }

    fn write_to(&self, out: &mut impl Write) -> std::io::Result<()> {
        write!(out, "HTTP/1.1 {} {}\r\n", self.status, self.reason())?;
        write!(out, "Content-Type: {}\r\n", self.content_type)?;
        out.write_all(b"Access-Control-Allow-Origin: *\r\n")?;
        out.write_all(b"Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n")?;
        out.write_all(b"Access-Control-Allow-Headers: Content-Type\r\n")?;
        write!(out, "Content-Length: {}\r\nConnection: close\r\n\r\n", self.body.len())?;
        out.write_all(self.body.as_bytes())?;
        out.flush()
    }
}

/// Atiende el contrato de [`RemoteSandbox`](crate::judge::judge_remote::RemoteSandbox)
/// con `sandbox`, un hilo por conexión. No vuelve mientras el listener siga abierto.
pub fn serve<S>(listener: TcpListener, sandbox: Arc<S>)
where
    S: Sandbox + Send + Sync + ?Sized + 'static,
{
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let sandbox = Arc::clone(&sandbox);
                thread::spawn(move || handle_connection(stream, &*sandbox));
            }
            Err(err) => warn!("error aceptando conexión: {err}"),
        }
    }
}

fn handle_connection<S: Sandbox + ?Sized>(stream: TcpStream, sandbox: &S) {
    if let Err(err) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
        warn!("no se pudo configurar la conexión: {err}");
        return;
    }
    let mut reader = BufReader::new(&stream);
    let response = match read_request(&mut reader) {
        Ok(request) => respond(request, sandbox),
        Err(reason) => Response::text(400, reason),
    };
    let mut writer = &stream;
    if let Err(err) = response.write_to(&mut writer) {
        debug!("el cliente cerró antes de la respuesta: {err}");
    }
}

fn respond<S: Sandbox + ?Sized>(request: Request, sandbox: &S) -> Response {
    match (request.method.as_str(), request.path.as_str()) {
        ("OPTIONS", _) => Response::text(204, ""),
        ("GET", "/health") => Response::text(200, "ok"),
        ("POST", RUN_PATH) => run_program(&request, sandbox),
        _ => Response::text(404, "not found"),
    }
}

fn run_program<S: Sandbox + ?Sized>(request: &Request, sandbox: &S) -> Response {
    let is_json = request
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("application/json"));
    if !is_json {
        return Response::text(415, "Solo se acepta Content-Type: application/json.");
    }

    let payload: RunRequest = match serde_json::from_slice(&request.body) {
        Ok(payload) => payload,
        Err(err) => return Response::text(400, format!("JSON inválido: {err}")),
    };

    match sandbox.run(&payload.program) {
        Ok(output) => Response::json(&RunResponse::from(output)),
        Err(err @ SandboxError::Timeout { .. }) => Response::text(504, err.to_string()),
        Err(err) => {
            error!("fallo ejecutando programa: {err}");
            Response::text(502, err.to_string())
        }
    }
}

fn read_line<R: BufRead>(reader: &mut R, line: &mut String) -> Result<usize, String> {
    line.clear();
    reader
        .by_ref()
        .take(MAX_LINE_BYTES)
        .read_line(line)
        .map_err(|err| format!("no se pudo leer la petición: {err}"))
}

fn read_request<R: BufRead>(reader: &mut R) -> Result<Request, String> {
    let mut line = String::new();
    read_line(reader, &mut line)?;
    let mut parts = line.split_whitespace();
    let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
        return Err(format!("línea de petición inválida: {:?}", line.trim_end()));
    };
    let (method, path) = (method.to_string(), path.to_string());

    let mut content_type = None;
    let mut content_length = 0usize;
    for _ in 0..=MAX_HEADERS {
        if read_line(reader, &mut line)? == 0 {
            return Err("conexión cerrada dentro de las cabeceras".into());
        }
        let header = line.trim_end();
        if header.is_empty() {
            if content_length > MAX_BODY_BYTES {
                return Err("body demasiado grande".into());
            }
            let mut body = vec![0; content_length];
            reader
                .read_exact(&mut body)
                .map_err(|err| format!("body incompleto: {err}"))?;
            return Ok(Request {
                method,
                path,
                content_type,
                body,
            });
        }

        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| format!("cabecera inválida: {header:?}"))?;
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value
                .parse()
                .map_err(|_| format!("Content-Length inválido: {value:?}"))?;
        } else if name.eq_ignore_ascii_case("content-type") {
            content_type = Some(value.to_string());
        }
    }
    Err("demasiadas cabeceras".into())
}
