//! MJPEG relay server
//!
//! Run with: mjpeg-relay [HTTP_ADDR] [UPSTREAM_ADDR]
//!
//! Examples:
//!   mjpeg-relay                              # HTTP on 0.0.0.0:80 (8080 fallback), upstream on 0.0.0.0:9999
//!   mjpeg-relay localhost:8080               # HTTP on 127.0.0.1:8080
//!   mjpeg-relay 0.0.0.0:8080 127.0.0.1:9999  # upstream only reachable locally
//!
//! ## Feeding the relay
//!
//! With gstreamer:
//!   gst-launch-1.0 v4l2src ! jpegenc ! multipartmux boundary=spionisto ! tcpclientsink port=9999
//!
//! ## Viewing
//!
//!   http://localhost:8080/stream.mjpeg   live stream
//!   http://localhost:8080/latest.jpeg    most recent frame

use std::net::SocketAddr;

use mjpeg_relay::{RelayServer, ServerConfig};

/// Parse a listen address from a command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:DEFAULT_PORT
/// - "localhost:8080" -> 127.0.0.1:8080
/// - "0.0.0.0" -> 0.0.0.0:DEFAULT_PORT
/// - "0.0.0.0:8080" -> 0.0.0.0:8080
fn parse_addr(arg: &str, default_port: u16) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }

    Err(format!(
        "Invalid address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: mjpeg-relay [HTTP_ADDR] [UPSTREAM_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  HTTP_ADDR      Viewer address (default: 0.0.0.0:80, falls back to 0.0.0.0:8080)");
    eprintln!("  UPSTREAM_ADDR  Camera source address (default: 0.0.0.0:9999)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RUST_LOG       Log filter, e.g. RUST_LOG=mjpeg_relay=debug");
}

fn exit_with_usage(error: String) -> ! {
    eprintln!("Error: {}", error);
    eprintln!();
    print_usage();
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let mut config = ServerConfig::default();

    if let Some(arg) = args.get(1) {
        // An explicit HTTP address disables the fallback port
        config = config
            .http(parse_addr(arg, 80).unwrap_or_else(|e| exit_with_usage(e)))
            .fallback_http(None);
    }
    if let Some(arg) = args.get(2) {
        config = config.upstream(parse_addr(arg, 9999).unwrap_or_else(|e| exit_with_usage(e)));
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mjpeg_relay=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    tracing::info!(
        http = %config.http_addr,
        upstream = %config.upstream_addr,
        boundary = config.relay.boundary.name(),
        "Starting MJPEG relay"
    );

    let server = RelayServer::new(config);
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addr() {
        assert_eq!(
            parse_addr("localhost", 80).unwrap(),
            "127.0.0.1:80".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_addr("0.0.0.0:9000", 80).unwrap(),
            "0.0.0.0:9000".parse::<SocketAddr>().unwrap()
        );
        assert!(parse_addr("not-an-address", 80).is_err());
    }
}
