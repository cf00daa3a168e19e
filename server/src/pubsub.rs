//! The pub/sub dispatcher (4.H): exact-channel and glob-pattern
//! subscriptions, fanned out to whichever connections are listening.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc::UnboundedSender;

use libnano::glob_match;

pub type ConnId = u64;

pub struct PubSub {
    channels: HashMap<Vec<u8>, HashSet<ConnId>>,
    patterns: HashMap<Vec<u8>, HashSet<ConnId>>,
    client_channels: HashMap<ConnId, HashSet<Vec<u8>>>,
    client_patterns: HashMap<ConnId, HashSet<Vec<u8>>>,
    senders: HashMap<ConnId, UnboundedSender<Vec<u8>>>,
}

impl PubSub {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
            patterns: HashMap::new(),
            client_channels: HashMap::new(),
            client_patterns: HashMap::new(),
            senders: HashMap::new(),
        }
    }

    pub fn register(&mut self, id: ConnId, sender: UnboundedSender<Vec<u8>>) {
        self.senders.insert(id, sender);
    }

    /// Returns the client's new total subscription count (channels + patterns).
    pub fn subscribe(&mut self, id: ConnId, channel: Vec<u8>) -> usize {
        self.channels.entry(channel.clone()).or_default().insert(id);
        self.client_channels.entry(id).or_default().insert(channel);
        self.subscription_count(id)
    }

    pub fn unsubscribe(&mut self, id: ConnId, channel: &[u8]) -> usize {
        if let Some(set) = self.channels.get_mut(channel) {
            set.remove(&id);
            if set.is_empty() {
                self.channels.remove(channel);
            }
        }
        if let Some(set) = self.client_channels.get_mut(&id) {
            set.remove(channel);
        }
        self.subscription_count(id)
    }

    pub fn psubscribe(&mut self, id: ConnId, pattern: Vec<u8>) -> usize {
        self.patterns.entry(pattern.clone()).or_default().insert(id);
        self.client_patterns.entry(id).or_default().insert(pattern);
        self.subscription_count(id)
    }

    pub fn punsubscribe(&mut self, id: ConnId, pattern: &[u8]) -> usize {
        if let Some(set) = self.patterns.get_mut(pattern) {
            set.remove(&id);
            if set.is_empty() {
                self.patterns.remove(pattern);
            }
        }
        if let Some(set) = self.client_patterns.get_mut(&id) {
            set.remove(pattern);
        }
        self.subscription_count(id)
    }

    pub fn client_channel_names(&self, id: ConnId) -> Vec<Vec<u8>> {
        self.client_channels
            .get(&id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn client_pattern_names(&self, id: ConnId) -> Vec<Vec<u8>> {
        self.client_patterns
            .get(&id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscription_count(&self, id: ConnId) -> usize {
        self.client_channels.get(&id).map_or(0, |s| s.len())
            + self.client_patterns.get(&id).map_or(0, |s| s.len())
    }

    pub fn is_subscribed(&self, id: ConnId) -> bool {
        self.subscription_count(id) > 0
    }

    /// Delivers `message` on `channel`, returning the count of distinct
    /// connections it was actually handed to (a send failure for a
    /// disconnected client is silently skipped; its own cleanup removes it).
    pub fn publish(&mut self, channel: &[u8], message: &[u8]) -> usize {
        let mut delivered = HashSet::new();
        if let Some(subs) = self.channels.get(channel) {
            for &id in subs {
                if self.send_message(id, channel, message) {
                    delivered.insert(id);
                }
            }
        }
        for (pattern, subs) in &self.patterns {
            if glob_match(pattern, channel) {
                for &id in subs {
                    if self.send_pmessage(id, pattern, channel, message) {
                        delivered.insert(id);
                    }
                }
            }
        }
        delivered.len()
    }

    fn send_message(&self, id: ConnId, channel: &[u8], message: &[u8]) -> bool {
        let Some(tx) = self.senders.get(&id) else {
            return false;
        };
        let frame = encode_message(channel, message);
        tx.send(frame).is_ok()
    }

    fn send_pmessage(&self, id: ConnId, pattern: &[u8], channel: &[u8], message: &[u8]) -> bool {
        let Some(tx) = self.senders.get(&id) else {
            return false;
        };
        let frame = encode_pmessage(pattern, channel, message);
        tx.send(frame).is_ok()
    }

    /// Removes every trace of a disconnected client.
    pub fn cleanup_client(&mut self, id: ConnId) {
        for channel in self.client_channels.remove(&id).unwrap_or_default() {
            if let Some(set) = self.channels.get_mut(&channel) {
                set.remove(&id);
                if set.is_empty() {
                    self.channels.remove(&channel);
                }
            }
        }
        for pattern in self.client_patterns.remove(&id).unwrap_or_default() {
            if let Some(set) = self.patterns.get_mut(&pattern) {
                set.remove(&id);
                if set.is_empty() {
                    self.patterns.remove(&pattern);
                }
            }
        }
        self.senders.remove(&id);
    }
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_message(channel: &[u8], message: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"*3\r\n");
    push_bulk(&mut out, b"message");
    push_bulk(&mut out, channel);
    push_bulk(&mut out, message);
    out
}

fn encode_pmessage(pattern: &[u8], channel: &[u8], message: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"*4\r\n");
    push_bulk(&mut out, b"pmessage");
    push_bulk(&mut out, pattern);
    push_bulk(&mut out, channel);
    push_bulk(&mut out, message);
    out
}

fn push_bulk(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(b"$");
    out.extend_from_slice(data.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

/// Encodes a `subscribe`/`unsubscribe`/`psubscribe`/`punsubscribe` ack.
pub fn encode_sub_ack(kind: &str, name: &[u8], total: usize) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"*3\r\n");
    push_bulk(&mut out, kind.as_bytes());
    push_bulk(&mut out, name);
    out.extend_from_slice(format!(":{total}\r\n").as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_pattern_fanout() {
        let mut ps = PubSub::new();
        let (tx1, mut rx1) = tokio::sync::mpsc::unbounded_channel();
        let (tx2, mut rx2) = tokio::sync::mpsc::unbounded_channel();
        ps.register(1, tx1);
        ps.register(2, tx2);
        ps.subscribe(1, b"news.sports".to_vec());
        ps.psubscribe(2, b"news.*".to_vec());

        let delivered = ps.publish(b"news.sports", b"hello");
        assert_eq!(delivered, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn cleanup_removes_all_subscriptions() {
        let mut ps = PubSub::new();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        ps.register(1, tx);
        ps.subscribe(1, b"a".to_vec());
        ps.psubscribe(1, b"b*".to_vec());
        ps.cleanup_client(1);
        assert_eq!(ps.publish(b"a", b"x"), 0);
        assert_eq!(ps.publish(b"bcd", b"x"), 0);
    }
}
