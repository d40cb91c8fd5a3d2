//! File server command.

use console::style;

use crate::config::Settings;

/// Start the file server.
pub async fn cmd_serve(settings: &Settings, bind: Option<&str>) -> anyhow::Result<()> {
    let addr = parse_bind_address(bind.unwrap_or(&settings.bind));

    println!("{} Serving files from {}", style("→").cyan(), settings.filedir.display());
    println!("{} Starting file server at http://{}", style("→").cyan(), addr);
    println!("  Press Ctrl+C to stop");

    crate::server::serve(settings, &addr).await
}

/// Parse a bind address that can be:
/// - Just a port: "3030" -> 127.0.0.1:3030
/// - Just a host: "0.0.0.0" -> 0.0.0.0:3030
/// - Host and port: "0.0.0.0:3030"
fn parse_bind_address(bind: &str) -> String {
    if let Ok(port) = bind.parse::<u16>() {
        return format!("127.0.0.1:{}", port);
    }
    if let Some((_, port)) = bind.rsplit_once(':') {
        if port.parse::<u16>().is_ok() {
            return bind.to_string();
        }
    }
    format!("{}:3030", bind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bind_address() {
        assert_eq!(parse_bind_address("8080"), "127.0.0.1:8080");
        assert_eq!(parse_bind_address("0.0.0.0"), "0.0.0.0:3030");
        assert_eq!(parse_bind_address("0.0.0.0:9000"), "0.0.0.0:9000");
    }
}
