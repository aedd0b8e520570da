//! Elastic streams: producer refcounting and runtime resize.

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use crate::stream::ElasticStream;

  /// Test: acquire 2 then close three times; closes exactly once, on the second call.
  #[test]
  fn test_closes_after_every_producer_released() {
    let stream = ElasticStream::<u32>::new(4);
    stream.acquire(2);

    assert!(!stream.close(), "one producer still holds the stream");
    assert!(!stream.is_closed());
    assert!(stream.close(), "last producer closes");
    assert!(stream.is_closed());
    assert!(!stream.close(), "extra close is a no-op");
  }

  #[test]
  fn test_close_without_acquire_closes_immediately() {
    let stream = ElasticStream::<u32>::new(1);
    assert!(stream.is_elastic());
    assert!(stream.close());
  }

  #[tokio::test]
  async fn test_inlet_close_releases_one_producer() {
    let stream = ElasticStream::new(8);
    stream.acquire(2);
    let (first, second) = (stream.inlet(), stream.inlet());

    first.send("a").await.expect("send");
    first.close();
    second.send("b").await.expect("second producer still open");
    second.close();

    let outlet = stream.outlet();
    assert_eq!(outlet.recv().await, Some("a"));
    assert_eq!(outlet.recv().await, Some("b"));
    assert_eq!(outlet.recv().await, None);
  }

  #[tokio::test]
  async fn test_growing_capacity_unblocks_sender() {
    let stream = ElasticStream::new(1);
    let inlet = stream.inlet();
    inlet.send(1).await.expect("fits");

    let pending = tokio::spawn(async move { inlet.send(2).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!pending.is_finished(), "full stream holds the sender");

    stream.resize(2);
    tokio::time::timeout(Duration::from_secs(1), pending)
      .await
      .expect("sender released by resize")
      .expect("join")
      .expect("send");
    assert_eq!(stream.len(), 2);
    assert_eq!(stream.capacity(), 2);
  }

  #[tokio::test]
  async fn test_shrinking_capacity_waits_for_drain() {
    let stream = ElasticStream::new(3);
    let inlet = stream.inlet();
    for value in 0..3 {
      inlet.send(value).await.expect("fits");
    }

    stream.resize(1);
    assert!(inlet.try_send(3).expect_err("over new capacity").is_full());

    let outlet = stream.outlet();
    outlet.recv().await;
    outlet.recv().await;
    assert!(inlet.try_send(3).expect_err("still at capacity").is_full());
    outlet.recv().await;
    inlet.try_send(3).expect("drained below capacity");
  }
}
