use anyhow::{Result, anyhow};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed * 100) / self.total).min(100) as u8
    }
}

/// Receives one notification per settled unit. Delivery is best-effort: an
/// error or a panic here is logged by the batch and otherwise ignored.
pub trait ProgressSink: Send + Sync {
    fn report(&self, completed: usize, total: usize) -> Result<()>;
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn report(&self, completed: usize, total: usize) -> Result<()> {
        self(completed, total);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _completed: usize, _total: usize) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ChannelProgress {
    sender: mpsc::UnboundedSender<Progress>,
}

impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Progress>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, completed: usize, total: usize) -> Result<()> {
        self.sender
            .send(Progress { completed, total })
            .map_err(|_| anyhow!("progress receiver is gone"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_down_and_handles_empty() {
        assert_eq!(Progress { completed: 1, total: 3 }.percent(), 33);
        assert_eq!(Progress { completed: 0, total: 0 }.percent(), 100);
    }

    #[tokio::test]
    async fn channel_reports_until_receiver_drops() {
        let (sink, mut receiver) = ChannelProgress::new();
        sink.report(1, 2).unwrap();
        assert_eq!(
            receiver.recv().await,
            Some(Progress {
                completed: 1,
                total: 2
            })
        );
        drop(receiver);
        assert!(sink.report(2, 2).is_err());
    }
}
