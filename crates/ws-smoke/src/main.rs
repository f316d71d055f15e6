use armview_core::Reading;
use armview_link::{Endpoint, LinkConfig, Transport, TransportEvent, WsTransport};
use tokio::time::{timeout_at, Duration, Instant};
use url::Url;

fn endpoint_from_arg(arg: Option<String>) -> Result<Endpoint, String> {
    let Some(raw) = arg else {
        return Ok(LinkConfig::from_env().endpoint);
    };
    let url = Url::parse(&raw).map_err(|e| format!("invalid url {raw}: {e}"))?;
    if url.scheme() != "ws" {
        return Err(format!("unsupported scheme {}", url.scheme()));
    }
    let host = url.host_str().ok_or_else(|| format!("no host in {raw}"))?;
    let port = url.port_or_known_default().unwrap_or(80);
    Ok(Endpoint::new(host, port))
}

#[tokio::main]
async fn main() {
    let endpoint = match endpoint_from_arg(std::env::args().nth(1)) {
        Ok(ep) => ep,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    eprintln!("Connecting to {}", endpoint.url());
    let mut conn = WsTransport.open(&endpoint);

    // Wait up to 5s for one decodable reading, then print and exit
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match timeout_at(deadline, conn.next_event()).await {
            Ok(Some(TransportEvent::Opened)) => eprintln!("WS connected"),
            Ok(Some(TransportEvent::Message(payload))) => match Reading::decode(&payload) {
                Ok(r) => {
                    let v = r.values();
                    println!("M1={} M2={} M3={} M4={} M5={} M6={}", v[0], v[1], v[2], v[3], v[4], v[5]);
                    return;
                }
                Err(e) => {
                    eprintln!("Undecodable frame ({e}): {}", String::from_utf8_lossy(&payload));
                    std::process::exit(5);
                }
            },
            Ok(Some(TransportEvent::Error(e))) => {
                eprintln!("WS error: {e}");
                std::process::exit(2);
            }
            Ok(Some(TransportEvent::Closed)) | Ok(None) => {
                eprintln!("WS closed by controller");
                std::process::exit(3);
            }
            Err(_) => {
                eprintln!("Timeout waiting for arm telemetry");
                std::process::exit(4);
            }
        }
    }
}
