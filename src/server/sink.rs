use std::sync::mpsc::Sender;

use tracing::debug;

/// Receives the uid of a card presented while a user is being enrolled.
pub trait UidSink {
    fn update_uid_label(&self, uid: &str);
}

/// Prints presented uids for the operator.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl UidSink for StdoutSink {
    fn update_uid_label(&self, uid: &str) {
        println!("Card presented: {uid}");
    }
}

impl UidSink for Sender<String> {
    fn update_uid_label(&self, uid: &str) {
        if self.send(uid.to_owned()).is_err() {
            debug!(uid, "Uid display closed, dropping update");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn sender_delivers_uid_verbatim() {
        let (tx, rx) = mpsc::channel();
        tx.update_uid_label(" 04:A2:19 ");
        assert_eq!(rx.try_recv().unwrap(), " 04:A2:19 ");
    }

    #[test]
    fn closed_display_is_ignored() {
        let (tx, rx) = mpsc::channel::<String>();
        drop(rx);
        tx.update_uid_label("42");
    }
}
