//! The UDP front-end.
//!
//! A single threaded tokio runtime waits on two things at once: datagrams arriving on the
//! listening socket, which are queued for the resolver, and the eventfd of the outbound queue,
//! which says replies are ready to be sent.

use std::{
    io,
    net::{SocketAddr, UdpSocket as StdUdpSocket},
    os::fd::AsRawFd,
    sync::Arc,
};

use tokio::{
    io::{unix::AsyncFd, Interest},
    net::UdpSocket,
};

use crate::{message::Message, proto::MAX_UDP_MESSAGE_SIZE, queue::MessageQueue};

/// Bind `listen` and serve until an unrecoverable I/O error occurs.
pub fn run(
    listen: SocketAddr,
    inbound: Arc<MessageQueue<Message>>,
    outbound: Arc<MessageQueue<Message>>,
) -> io::Result<()> {
    let socket = StdUdpSocket::bind(listen)?;
    run_with_socket(socket, inbound, outbound)
}

/// Serve on an already bound socket.
pub fn run_with_socket(
    socket: StdUdpSocket,
    inbound: Arc<MessageQueue<Message>>,
    outbound: Arc<MessageQueue<Message>>,
) -> io::Result<()> {
    socket.set_nonblocking(true)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()?;
    runtime.block_on(async move {
        let socket = UdpSocket::from_std(socket)?;
        tracing::info!("Listening on udp://{}", socket.local_addr()?);
        serve(socket, inbound, outbound).await
    })
}

async fn serve(
    socket: UdpSocket,
    inbound: Arc<MessageQueue<Message>>,
    outbound: Arc<MessageQueue<Message>>,
) -> io::Result<()> {
    let source = socket.as_raw_fd();
    let replies = AsyncFd::with_interest(Arc::clone(&outbound), Interest::READABLE)?;
    let mut buffer = [0u8; MAX_UDP_MESSAGE_SIZE];

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buffer) => match received {
                Ok((size, peer)) => {
                    tracing::trace!("Received {size} bytes from {peer}");
                    inbound.push(Message::udp(&buffer[..size], peer, source));
                }
                Err(err) => tracing::warn!("Failed to receive a datagram: {err}"),
            },
            ready = replies.readable() => {
                let mut guard = ready?;
                match guard.try_io(|queue| queue.get_ref().consume_event()) {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => tracing::warn!("Failed to reset the reply queue event: {err}"),
                    Err(_would_block) => continue,
                }
                while let Some(reply) = outbound.try_pop() {
                    if let Err(err) = socket.send_to(&reply.data, reply.peer).await {
                        tracing::warn!("Failed to send reply to {}: {err}", reply.peer);
                    }
                }
            }
        }
    }
}
