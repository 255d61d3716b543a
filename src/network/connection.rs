use socket2::SockRef;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::core::{Config, Error, Result};

/// Opens the TCP connection to the configured server within the connect timeout
pub(crate) async fn connect(config: &Config) -> Result<TcpStream> {
    let endpoint = config.endpoint();
    debug!(%endpoint, timeout_ms = config.connect_timeout.as_millis() as u64, "connecting");

    let attempt = TcpStream::connect((config.server.as_str(), config.port));
    let stream = match timeout(config.connect_timeout, attempt).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            warn!(%endpoint, error = %e, "connection failed");
            return Err(Error::network(format!(
                "Failed to connect to {}: {}",
                endpoint, e
            )));
        }
        Err(_) => {
            warn!(%endpoint, "connection timed out");
            return Err(Error::ConnectTimeout(endpoint));
        }
    };

    configure(&stream)?;
    Ok(stream)
}

/// Small frames go out immediately; dead peers are detected by the OS as well
fn configure(stream: &TcpStream) -> Result<()> {
    let socket = SockRef::from(stream);
    socket.set_nodelay(true)?;
    socket.set_keepalive(true)?;
    Ok(())
}
