//! Delivery semantics of plain streams: ordering, close, backpressure and
//! rendezvous hand-off.

#[cfg(test)]
mod tests {
  use std::{collections::HashSet, time::Duration};

  use pretty_assertions::assert_eq;
  use sluice_core::Address;

  use crate::stream::{SendError, Stream, TryRecvError, TrySendError};

  // ==========================================================================
  // Buffered Streams
  // ==========================================================================

  #[tokio::test]
  async fn test_values_arrive_in_send_order() {
    let stream = Stream::new(8);
    let (inlet, outlet) = (stream.inlet(), stream.outlet());

    for value in 0..5 {
      inlet.send(value).await.expect("send");
    }
    inlet.close();

    let mut received = Vec::new();
    while let Some(value) = outlet.recv().await {
      received.push(value);
    }
    assert_eq!(received, vec![0, 1, 2, 3, 4]);
  }

  #[tokio::test]
  async fn test_close_drains_buffer_before_end_of_stream() {
    let stream = Stream::new(4);
    stream.inlet().send("queued").await.expect("send");
    assert!(stream.close());

    assert!(stream.is_closed());
    assert_eq!(stream.outlet().recv().await, Some("queued"));
    assert_eq!(stream.outlet().recv().await, None);
  }

  #[tokio::test]
  async fn test_send_after_close_returns_value() {
    let stream = Stream::new(1);
    stream.close();

    let err = stream.inlet().send(42).await.expect_err("closed stream");
    assert_eq!(err, SendError(42));
    assert_eq!(stream.inlet().try_send(7), Err(TrySendError::Closed(7)));
  }

  #[test]
  fn test_close_reports_only_first_call() {
    let stream = Stream::<u8>::new(1);
    assert!(stream.close());
    assert!(!stream.close());
    assert!(!stream.inlet().close());
  }

  #[tokio::test]
  async fn test_full_stream_blocks_sender_until_received() {
    let stream = Stream::new(1);
    let inlet = stream.inlet();
    inlet.send(1).await.expect("first send fits");
    assert!(inlet.try_send(2).expect_err("full").is_full());

    let blocked = tokio::time::timeout(Duration::from_millis(50), inlet.send(2)).await;
    assert!(blocked.is_err(), "send should wait while the stream is full");

    let outlet = stream.outlet();
    let sender = tokio::spawn(async move { inlet.send(3).await });
    assert_eq!(outlet.recv().await, Some(1));
    sender.await.expect("join").expect("send after space frees");
    assert_eq!(outlet.recv().await, Some(3));
  }

  #[test]
  fn test_try_recv_distinguishes_empty_and_closed() {
    let stream = Stream::<u8>::new(2);
    assert_eq!(stream.outlet().try_recv(), Err(TryRecvError::Empty));
    stream.close();
    assert_eq!(stream.outlet().try_recv(), Err(TryRecvError::Closed));
  }

  #[tokio::test]
  async fn test_competing_consumers_each_value_delivered_once() {
    let stream = Stream::new(4);
    let consumers: Vec<_> = (0..3)
      .map(|_| {
        let outlet = stream.outlet();
        tokio::spawn(async move {
          let mut seen = Vec::new();
          while let Some(value) = outlet.recv().await {
            seen.push(value);
          }
          seen
        })
      })
      .collect();

    let inlet = stream.inlet();
    for value in 0..100u32 {
      inlet.send(value).await.expect("send");
    }
    inlet.close();

    let mut all = Vec::new();
    for consumer in consumers {
      all.extend(consumer.await.expect("join"));
    }
    assert_eq!(all.len(), 100);
    assert_eq!(all.iter().copied().collect::<HashSet<_>>().len(), 100);
  }

  // ==========================================================================
  // Rendezvous
  // ==========================================================================

  #[tokio::test]
  async fn test_rendezvous_send_waits_for_receiver() {
    let stream = Stream::new(0);
    let inlet = stream.inlet();

    let alone = tokio::time::timeout(Duration::from_millis(50), inlet.send(1)).await;
    assert!(alone.is_err(), "rendezvous send completes only once received");

    let outlet = stream.outlet();
    let receiver = tokio::spawn(async move { (outlet.recv().await, outlet.recv().await) });
    inlet.send(2).await.expect("hand-off");

    // The value left behind by the timed-out send is taken first
    assert_eq!(receiver.await.expect("join"), (Some(1), Some(2)));
  }

  #[tokio::test]
  async fn test_rendezvous_try_send_needs_waiting_receiver() {
    let stream = Stream::new(0);
    assert!(stream.inlet().try_send(1).expect_err("nobody waiting").is_full());

    let outlet = stream.outlet();
    let receiver = tokio::spawn(async move { outlet.recv().await });
    while stream.inlet().try_send(2).is_err() {
      tokio::task::yield_now().await;
    }
    assert_eq!(receiver.await.expect("join"), Some(2));
  }

  // ==========================================================================
  // Addresses
  // ==========================================================================

  #[test]
  fn test_addresses_are_metadata_on_every_handle() {
    let stream = Stream::<u8>::new(1);
    assert_eq!(stream.inlet_address(), None);

    stream.set_inlet_address("producer");
    stream.set_outlet_address(Address::new("consumer"));

    assert_eq!(stream.inlet().inlet_address(), Some(Address::from("producer")));
    assert_eq!(stream.outlet().outlet_address(), Some(Address::from("consumer")));
    assert!(stream.same_stream(&stream.clone()));
    assert!(!stream.same_stream(&Stream::new(1)));
  }
}
