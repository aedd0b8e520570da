//! Fan-in/fan-out segments: Confluence, Delta, Switch and BatchSwitch.

#[cfg(test)]
mod tests {
  use std::{collections::BTreeMap, time::Duration};

  use pretty_assertions::assert_eq;
  use sluice_core::{Address, AddressError};

  use crate::{
    error::{ContractViolation, FlowError},
    group::TaskGroup,
    segment::{
      BatchSwitch, Confluence, Delta, Flow, FlowOptions, Sink, Source, Switch,
      __tests__::helpers::{closing, drain, filled},
    },
    stream::Stream,
  };

  fn addressed(address: &str, capacity: usize) -> Stream<u32> {
    let stream = Stream::new(capacity);
    stream.set_outlet_address(address);
    stream
  }

  // ==========================================================================
  // Confluence
  // ==========================================================================

  #[tokio::test]
  async fn test_confluence_copies_to_every_output_preserving_input_order() {
    let group = TaskGroup::new();
    let (left, right) = (Stream::new(16), Stream::new(16));

    let mut merge = Confluence::new();
    merge
      .connect_inputs(vec![filled([1, 2, 3]).outlet(), filled([10, 20, 30]).outlet()])
      .expect("inputs");
    merge
      .connect_outputs(vec![left.inlet(), right.inlet()])
      .expect("outputs");
    merge.flow(&group, closing()).expect("flow");

    let left = drain(left.outlet()).await;
    let right = drain(right.outlet()).await;
    group.wait_on_all().await.expect("clean exit");

    for output in [&left, &right] {
      assert_eq!(output.len(), 6);
      let small: Vec<u32> = output.iter().copied().filter(|value| *value < 10).collect();
      let large: Vec<u32> = output.iter().copied().filter(|value| *value >= 10).collect();
      assert_eq!(small, vec![1, 2, 3]);
      assert_eq!(large, vec![10, 20, 30]);
    }
  }

  // ==========================================================================
  // Delta
  // ==========================================================================

  /// Test: first ready output wins; with every output full the value is dropped.
  #[tokio::test]
  async fn test_delta_delivers_once_or_drops() {
    let group = TaskGroup::new();
    let (first, second) = (Stream::new(1), Stream::new(1));

    let mut spread = Delta::new();
    let dropped = spread.drop_counter();
    spread.connect_inputs(vec![filled([1, 2, 3]).outlet()]).expect("input");
    spread
      .connect_outputs(vec![first.inlet(), second.inlet()])
      .expect("outputs");
    spread.flow(&group, closing()).expect("flow");

    group.wait_on_all().await.expect("clean exit");
    assert_eq!(drain(first.outlet()).await, vec![1]);
    assert_eq!(drain(second.outlet()).await, vec![2]);
    assert_eq!(dropped.load(std::sync::atomic::Ordering::Relaxed), 1);
  }

  #[tokio::test]
  async fn test_delta_prefers_earlier_outputs() {
    let group = TaskGroup::new();
    let (first, second) = (Stream::new(8), Stream::new(8));

    let mut spread = Delta::new();
    spread.connect_inputs(vec![filled([1, 2, 3]).outlet()]).expect("input");
    spread
      .connect_outputs(vec![first.inlet(), second.inlet()])
      .expect("outputs");
    spread.flow(&group, closing()).expect("flow");

    assert_eq!(drain(first.outlet()).await, vec![1, 2, 3]);
    assert!(drain(second.outlet()).await.is_empty());
    assert_eq!(spread.dropped(), 0);
    group.wait_on_all().await.expect("clean exit");
  }

  /// Test: a rendezvous output takes a value only while its consumer is parked.
  #[tokio::test]
  async fn test_delta_rendezvous_output_needs_parked_consumer() {
    let group = TaskGroup::new();
    let (input, output) = (Stream::new(4), Stream::new(0));
    let feed = input.inlet();

    let mut spread = Delta::new();
    spread.connect_inputs(vec![input.outlet()]).expect("input");
    spread.connect_outputs(vec![output.inlet()]).expect("output");
    spread.flow(&group, closing()).expect("flow");

    feed.try_send(1u32).expect("input has room");
    tokio::time::timeout(Duration::from_secs(1), async {
      while spread.dropped() < 1 {
        tokio::time::sleep(Duration::from_millis(1)).await;
      }
    })
    .await
    .expect("nobody receiving, value dropped");

    let outlet = output.outlet();
    let consumer = tokio::spawn(async move { outlet.recv().await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    feed.try_send(2).expect("input has room");
    let received = tokio::time::timeout(Duration::from_secs(1), consumer)
      .await
      .expect("parked consumer is served")
      .expect("consumer task");
    assert_eq!(received, Some(2));
    assert_eq!(spread.dropped(), 1);

    input.close();
    group.wait_on_all().await.expect("clean exit");
  }

  // ==========================================================================
  // Switch
  // ==========================================================================

  #[tokio::test]
  async fn test_switch_routes_by_resolved_address() {
    let group = TaskGroup::new();
    let (even, odd) = (addressed("even", 8), addressed("odd", 8));

    let mut parity = Switch::new(|value: &u32| Ok(Address::from(if value % 2 == 0 { "even" } else { "odd" })));
    parity.connect_inputs(vec![filled(1..=5).outlet()]).expect("input");
    parity.connect_outputs(vec![even.inlet(), odd.inlet()]).expect("outputs");
    parity.flow(&group, closing()).expect("flow");

    assert_eq!(drain(even.outlet()).await, vec![2, 4]);
    assert_eq!(drain(odd.outlet()).await, vec![1, 3, 5]);
    group.wait_on_all().await.expect("clean exit");
  }

  #[tokio::test]
  async fn test_switch_unknown_address_is_fatal() {
    let group = TaskGroup::new();
    let known = addressed("known", 8);

    let mut lost = Switch::new(|_value: &u32| Ok(Address::from("nowhere")));
    lost.connect_inputs(vec![filled([1]).outlet()]).expect("input");
    lost.connect_outputs(vec![known.inlet()]).expect("output");
    lost.flow(&group, closing()).expect("flow");

    let err = group.wait_on_all().await.expect_err("fatal");
    assert!(matches!(
      err,
      FlowError::Address(AddressError::NotFound(address)) if address == Address::from("nowhere")
    ));
  }

  #[tokio::test]
  async fn test_switch_requires_addressed_outputs() {
    let group = TaskGroup::new();
    let anonymous = Stream::new(1);

    let mut switch = Switch::new(|_value: &u32| Ok(Address::from("anywhere")));
    switch.connect_inputs(vec![filled([1]).outlet()]).expect("input");
    switch.connect_outputs(vec![anonymous.inlet()]).expect("output");

    let err = switch.flow(&group, FlowOptions::new()).expect_err("unaddressed output");
    assert!(matches!(
      err,
      FlowError::Contract(ContractViolation::Unaddressed { segment: "Switch", .. })
    ));
  }

  // ==========================================================================
  // BatchSwitch
  // ==========================================================================

  #[tokio::test]
  async fn test_batch_switch_splits_across_addresses() {
    let group = TaskGroup::new();
    let (units, tens) = (addressed("units", 8), addressed("tens", 8));

    let mut split = BatchSwitch::new(|value: u32| {
      Ok(BTreeMap::from([
        (Address::from("units"), value % 10),
        (Address::from("tens"), value / 10),
      ]))
    });
    split.connect_inputs(vec![filled([42, 17]).outlet()]).expect("input");
    split.connect_outputs(vec![units.inlet(), tens.inlet()]).expect("outputs");
    split.flow(&group, closing()).expect("flow");

    assert_eq!(drain(units.outlet()).await, vec![2, 7]);
    assert_eq!(drain(tens.outlet()).await, vec![4, 1]);
    group.wait_on_all().await.expect("clean exit");
  }

  /// Test: parts before the unknown address are delivered, then the task fails.
  #[tokio::test]
  async fn test_batch_switch_is_not_atomic() {
    let group = TaskGroup::new();
    let alpha = addressed("alpha", 8);

    let mut split = BatchSwitch::new(|value: u32| {
      Ok(BTreeMap::from([
        (Address::from("alpha"), value),
        (Address::from("omega"), value),
      ]))
    });
    split.connect_inputs(vec![filled([5]).outlet()]).expect("input");
    split.connect_outputs(vec![alpha.inlet()]).expect("output");
    split.flow(&group, closing()).expect("flow");

    group.wait_on_all().await.expect_err("omega is unknown");
    assert_eq!(drain(alpha.outlet()).await, vec![5]);
  }
}
