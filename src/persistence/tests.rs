use tempfile::tempdir;

use super::Persistence;
use crate::dispatcher::{AdmissionPolicy, Dispatcher, Envelope, Message, MessageId};

async fn admitted(channel: &str, title: &str) -> Envelope {
    let dispatcher = Dispatcher::new(channel, 1, AdmissionPolicy::Reject);
    dispatcher.enqueue(Message::new(title)).await.unwrap();
    dispatcher.try_dequeue().unwrap()
}

#[tokio::test]
async fn test_record_and_find_dead_letter() {
    let store = Persistence::temporary().unwrap();
    let envelope = admitted("producer", "broken").await;

    store
        .record_dead_letter(&envelope, 3, "processor exploded")
        .unwrap();

    assert_eq!(store.dead_letter_count(), 1);
    let found = store.find_dead_letter(envelope.id()).unwrap().unwrap();
    assert_eq!(found.envelope, envelope);
    assert_eq!(found.attempts, 3);
    assert_eq!(found.last_error, "processor exploded");

    let other = admitted("producer", "fine").await;
    assert!(store.find_dead_letter(other.id()).unwrap().is_none());
}

#[tokio::test]
async fn test_find_dead_letter_by_printed_id() {
    let store = Persistence::temporary().unwrap();
    let envelope = admitted("producer", "broken").await;
    store.record_dead_letter(&envelope, 1, "boom").unwrap();

    let id: MessageId = envelope.id().to_string().parse().unwrap();
    let found = store.find_dead_letter(id).unwrap().unwrap();
    assert_eq!(found.envelope.title(), "broken");

    assert!("not-a-uuid".parse::<MessageId>().is_err());
}

#[tokio::test]
async fn test_dead_letters_listed_oldest_first() {
    let store = Persistence::temporary().unwrap();
    for title in ["first", "second", "third"] {
        let envelope = admitted("producer", title).await;
        store.record_dead_letter(&envelope, 1, "nope").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
    }

    let titles: Vec<_> = store
        .dead_letters()
        .unwrap()
        .into_iter()
        .map(|d| d.envelope.title().to_string())
        .collect();
    assert_eq!(titles, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_unacked_mark_and_clear() {
    let store = Persistence::temporary().unwrap();
    let envelope = admitted("producer", "in flight").await;

    store.mark_unacked(&envelope).unwrap();
    store.mark_unacked(&envelope).unwrap();
    assert_eq!(store.unacked_count(), 1);
    assert_eq!(store.unacked().unwrap(), vec![envelope.clone()]);

    store.clear_unacked(&envelope).unwrap();
    assert_eq!(store.unacked_count(), 0);
}

#[tokio::test]
async fn test_unacked_is_keyed_per_channel() {
    let store = Persistence::temporary().unwrap();
    let upstream = admitted("producer", "same").await;
    let downstream = admitted("consumer", "same").await;

    store.mark_unacked(&upstream).unwrap();
    store.mark_unacked(&downstream).unwrap();
    assert_eq!(store.unacked_count(), 2);

    store.clear_unacked(&upstream).unwrap();
    let left = store.unacked().unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].channel(), "consumer");
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = tempdir().unwrap();
    let envelope = admitted("producer", "durable").await;

    {
        let store = Persistence::open(dir.path()).unwrap();
        store.record_dead_letter(&envelope, 2, "gave up").unwrap();
        store.mark_unacked(&envelope).unwrap();
        store.flush().unwrap();
    }

    let store = Persistence::open(dir.path()).unwrap();
    assert_eq!(store.dead_letter_count(), 1);
    assert_eq!(store.unacked().unwrap()[0].id(), envelope.id());
}
