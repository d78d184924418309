// src/bot/timers.rs - Scheduled announcements

use chrono::{DateTime, Timelike, Utc};
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::bot::commands::pick;
use crate::config::{ChatRouting, ConfigurationManager};
use crate::platforms::Transport;

/// Seconds from `now` until the next full hour; never zero
pub fn seconds_until_next_hour(now: DateTime<Utc>) -> u64 {
    let into_hour = u64::from(now.minute()) * 60 + u64::from(now.second());
    3600 - into_hour
}

/// Posts the newbie announcement to every newbies thread at the top of each hour
pub struct AnnouncementTimer {
    config: ConfigurationManager,
    routing: ChatRouting,
    transport: Arc<dyn Transport>,
    shutdown_signal: Arc<AtomicBool>,
}

impl AnnouncementTimer {
    pub fn new(config: ConfigurationManager, routing: ChatRouting, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            routing,
            transport,
            shutdown_signal: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting this flag stops the loop before its next post
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown_signal)
    }

    /// Post one round of announcements. Returns how many were delivered.
    pub async fn announce_once(&self) -> usize {
        let snapshot = self.config.snapshot().await;
        let templates = &snapshot.templates;
        let tip = pick(&templates.safety_tips).unwrap_or_default();
        let text = templates.newbie_announcement(tip);

        let mut delivered = 0;
        for (chat_id, thread_id) in self.routing.newbie_threads() {
            match self.transport.send_reply(&chat_id, &text, Some(&thread_id), None).await {
                Ok(()) => {
                    debug!("Posted newbie announcement to {} thread {}", chat_id, thread_id);
                    delivered += 1;
                }
                Err(e) => error!("Failed to post announcement to {}: {}", chat_id, e),
            }
        }
        delivered
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Announcement timer started for {} newbies thread(s)",
                self.routing.newbie_threads().len()
            );

            loop {
                let wait = seconds_until_next_hour(Utc::now());
                tokio::time::sleep(Duration::from_secs(wait)).await;

                if self.shutdown_signal.load(Ordering::Relaxed) {
                    info!("Announcement timer received shutdown signal");
                    break;
                }

                let delivered = self.announce_once().await;
                info!("Hourly announcement delivered to {} thread(s)", delivered);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatThreads;
    use crate::platforms::{DryRunTransport, TransportOperation};
    use chrono::TimeZone;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_seconds_until_next_hour() {
        let at = |h, m, s| Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap();

        assert_eq!(seconds_until_next_hour(at(10, 0, 0)), 3600);
        assert_eq!(seconds_until_next_hour(at(10, 59, 59)), 1);
        assert_eq!(seconds_until_next_hour(at(10, 30, 0)), 1800);
    }

    #[tokio::test]
    async fn test_announce_once_posts_to_newbie_threads() {
        let temp_dir = tempdir().unwrap();
        let manager = ConfigurationManager::new(temp_dir.path().join("config"));
        manager.initialize().await.unwrap();

        let mut threads = HashMap::new();
        threads.insert(
            "-1001".to_string(),
            ChatThreads {
                newbies: Some("3".to_string()),
                ..Default::default()
            },
        );
        let routing = ChatRouting {
            moderated_chats: ["-1001".to_string(), "-1002".to_string()].into_iter().collect(),
            threads,
        };

        let transport = Arc::new(DryRunTransport::recording());
        let timer = AnnouncementTimer::new(manager, routing, transport.clone());

        assert_eq!(timer.announce_once().await, 1);
        match &transport.operations().await[..] {
            [TransportOperation::Reply { chat_id, text, thread_id, reply_to }] => {
                assert_eq!(chat_id, "-1001");
                assert_eq!(thread_id.as_deref(), Some("3"));
                assert_eq!(*reply_to, None);
                assert!(text.contains("Safety Tip"));
            }
            other => panic!("unexpected operations: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_post_is_isolated() {
        let temp_dir = tempdir().unwrap();
        let manager = ConfigurationManager::new(temp_dir.path().join("config"));
        manager.initialize().await.unwrap();

        let mut threads = HashMap::new();
        threads.insert(
            "-1001".to_string(),
            ChatThreads {
                newbies: Some("3".to_string()),
                ..Default::default()
            },
        );
        let routing = ChatRouting {
            moderated_chats: ["-1001".to_string()].into_iter().collect(),
            threads,
        };

        let timer = AnnouncementTimer::new(manager, routing, Arc::new(DryRunTransport::recording().failing_replies()));
        assert_eq!(timer.announce_once().await, 0);
    }
}
