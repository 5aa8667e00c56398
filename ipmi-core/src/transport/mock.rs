//! Scripted mock transport for tests.
//!
//! Each call to [`Transport::send`] records the frame; each call to
//! [`Transport::recv`] pops the next scripted reply. A script entry can
//! also simulate a timeout or inject an arbitrary frame (garbage, a
//! stray reply with the wrong sequence), which is how the dispatcher's
//! retry and drop paths are exercised.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::IpmiError;
use crate::transport::Transport;

/// One scripted reaction to a `recv` call.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Hand this frame to the caller.
    Frame(Vec<u8>),
    /// Pretend nothing arrived within the timeout.
    Timeout,
}

/// A transport whose replies are fully scripted.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: VecDeque<MockReply>,
    /// Every frame handed to `send`, in order.
    pub sent: Vec<Vec<u8>>,
    pub closed: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame reply to the script.
    pub fn push_frame(&mut self, frame: Vec<u8>) -> &mut Self {
        self.script.push_back(MockReply::Frame(frame));
        self
    }

    /// Append a simulated receive timeout to the script.
    pub fn push_timeout(&mut self) -> &mut Self {
        self.script.push_back(MockReply::Timeout);
        self
    }

    /// Number of scripted replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: &[u8]) -> Result<(), IpmiError> {
        self.sent.push(frame.to_vec());
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Vec<u8>, IpmiError> {
        match self.script.pop_front() {
            Some(MockReply::Frame(frame)) => Ok(frame),
            Some(MockReply::Timeout) | None => Err(IpmiError::Timeout(timeout)),
        }
    }

    async fn close(&mut self) -> Result<(), IpmiError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replies_pop_in_order() {
        let mut mock = MockTransport::new();
        mock.push_frame(vec![1]).push_timeout().push_frame(vec![2]);

        mock.send(&[0xAA]).await.unwrap();
        assert_eq!(mock.sent, vec![vec![0xAA]]);

        assert_eq!(mock.recv(Duration::from_secs(1)).await.unwrap(), vec![1]);
        assert!(matches!(
            mock.recv(Duration::from_secs(1)).await,
            Err(IpmiError::Timeout(_))
        ));
        assert_eq!(mock.recv(Duration::from_secs(1)).await.unwrap(), vec![2]);
        // Script exhausted — behaves like silence.
        assert!(matches!(
            mock.recv(Duration::from_secs(1)).await,
            Err(IpmiError::Timeout(_))
        ));
    }
}
