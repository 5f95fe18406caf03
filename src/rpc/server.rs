use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::hub::HubClient;

use super::{dispatch, RpcRequest, RpcResponse};

/// Accept loop. Each connection gets its own task; all of them share
/// the one hub client and therefore its exclusive-access discipline.
pub async fn serve(listener: TcpListener, client: Arc<HubClient>) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    log::info!("RPC server for hub '{}' listening on {}", client.identifier(), addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        log::debug!("Accepted RPC connection from {}", peer);
        let client = client.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, client).await {
                log::warn!("RPC connection from {} closed with error: {}", peer, e);
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, client: Arc<HubClient>) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => {
                log::debug!("RPC call id={} method={}", request.id, request.method);
                dispatch(&client, request).await
            }
            Err(e) => RpcResponse::err(0, "bad_request", e.to_string()),
        };
        let mut payload = serde_json::to_string(&response)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        payload.push('\n');
        write_half.write_all(payload.as_bytes()).await?;
    }

    Ok(())
}
