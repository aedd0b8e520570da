//! Registry and router wiring: stitch topologies, role checks, sealing.

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use pretty_assertions::assert_eq;
  use sluice_core::{Address, AddressError, StreamConfig};

  use crate::{
    error::{ContractViolation, FlowError, Role, Side},
    group::TaskGroup,
    pipeline::{
      Pipeline, Router, Stitch,
      __tests__::helpers::{collector, counter, relay},
    },
    segment::{Flow, FlowOptions, LinearTransform},
    stream::Stream,
  };

  /// Two relays on each side: `s1`, `s2` feed `t1`, `t2`
  fn two_by_two() -> Pipeline<u64> {
    let mut pipeline = Pipeline::new("grid");
    for address in ["s1", "s2", "t1", "t2"] {
      pipeline.segment(address, relay()).expect("register");
    }
    pipeline
  }

  fn distinct_streams(pipeline: &Pipeline<u64>) -> usize {
    pipeline
      .routes()
      .iter()
      .map(|route| route.stream)
      .collect::<HashSet<_>>()
      .len()
  }

  // ==========================================================================
  // Stitches
  // ==========================================================================

  #[test]
  fn test_stitch_stream_counts() {
    let cases = [
      (Stitch::Weave, 4),
      (Stitch::Divergent, 2),
      (Stitch::Convergent, 2),
      (Stitch::Unary, 1),
    ];

    for (stitch, expected) in cases {
      let mut pipeline = two_by_two();
      let streams = Router::new(stitch)
        .from(["s1", "s2"])
        .to(["t1", "t2"])
        .route(&mut pipeline)
        .expect("route");

      assert_eq!(streams.len(), expected, "{stitch} creates {expected} streams");
      assert_eq!(distinct_streams(&pipeline), expected, "{stitch} route table");
      assert_eq!(pipeline.routes().len(), 4, "{stitch} routes every pair");
    }
  }

  #[test]
  fn test_shared_producers_get_elastic_streams() {
    let mut pipeline = two_by_two();
    let convergent = Router::new(Stitch::Convergent)
      .from(["s1", "s2"])
      .to(["t1"])
      .route(&mut pipeline)
      .expect("route");
    assert!(convergent[0].is_elastic());

    let divergent = Router::new(Stitch::Divergent)
      .from(["s1"])
      .to(["t2"])
      .route(&mut pipeline)
      .expect("route");
    assert!(!divergent[0].is_elastic());
  }

  #[test]
  fn test_router_capacity_from_config() {
    let mut pipeline = two_by_two();
    let streams = Router::with_config(Stitch::Unary, &StreamConfig { capacity: 3 })
      .from(["s1"])
      .to(["t1"])
      .route(&mut pipeline)
      .expect("route");
    assert_eq!(streams[0].capacity(), 3);

    let rendezvous = Router::new(Stitch::Unary)
      .capacity(0)
      .elastic()
      .from(["s2"])
      .to(["t2"])
      .route(&mut pipeline)
      .expect("route");
    assert_eq!(rendezvous[0].capacity(), 0);
    assert!(rendezvous[0].is_elastic());
  }

  #[test]
  fn test_streams_carry_route_addresses() {
    let mut pipeline = two_by_two();
    Router::new(Stitch::Weave)
      .from(["s1"])
      .to(["t2"])
      .route(&mut pipeline)
      .expect("route");

    let stream = pipeline
      .stream(&Address::from("s1"), &Address::from("t2"))
      .expect("routed");
    assert_eq!(stream.inlet_address(), Some(Address::from("s1")));
    assert_eq!(stream.outlet_address(), Some(Address::from("t2")));
  }

  // ==========================================================================
  // Connect Primitive
  // ==========================================================================

  #[test]
  fn test_unknown_address_leaves_pipeline_untouched() {
    let mut pipeline = two_by_two();
    let err = Router::new(Stitch::Weave)
      .from(["s1"])
      .to(["t1", "ghost"])
      .route(&mut pipeline)
      .expect_err("ghost is not registered");

    assert!(matches!(err, FlowError::Address(AddressError::NotFound(address)) if address.as_str() == "ghost"));
    assert!(pipeline.routes().is_empty());
  }

  #[test]
  fn test_wrong_role_is_rejected() {
    let mut pipeline = Pipeline::new("roles");
    pipeline.source("numbers", counter(3)).expect("register");
    let (sink, _) = collector();
    pipeline.sink("collect", sink).expect("register");

    let err = Router::new(Stitch::Unary)
      .from(["collect"])
      .to(["numbers"])
      .route(&mut pipeline)
      .expect_err("roles reversed");
    assert!(matches!(err, FlowError::WrongRole { role: Role::Source, .. }));
    assert!(pipeline.routes().is_empty());
  }

  /// Test: routing an already routed pair does not attach the sink twice.
  #[test]
  fn test_existing_pair_is_skipped() {
    let mut pipeline = Pipeline::new("repeat");
    pipeline.source("numbers", counter(3)).expect("register");
    let (sink, _) = collector();
    pipeline.sink("collect", sink).expect("register");

    for _ in 0..2 {
      Router::new(Stitch::Unary)
        .from(["numbers"])
        .to(["collect"])
        .route(&mut pipeline)
        .expect("single-input sink stays within arity");
    }
    assert_eq!(pipeline.routes().len(), 1);
  }

  /// Test: a route that overflows one segment's arity wires nothing at all,
  /// so the other segments stay free for a later route.
  #[test]
  fn test_arity_overflow_leaves_pipeline_untouched() {
    let mut pipeline = Pipeline::new("arity");
    for address in ["s1", "s2"] {
      pipeline
        .segment(address, LinearTransform::new(|value: u64| Ok(value + 1)))
        .expect("register");
    }
    for address in ["t", "t2"] {
      let (sink, _) = collector();
      pipeline.sink(address, sink).expect("register");
    }

    let err = Router::new(Stitch::Weave)
      .from(["s1", "s2"])
      .to(["t"])
      .route(&mut pipeline)
      .expect_err("t reads a single stream");
    assert!(matches!(
      err,
      FlowError::Contract(ContractViolation::TooMany {
        side: Side::Inputs,
        max: 1,
        actual: 2,
        ..
      })
    ));
    assert!(pipeline.routes().is_empty());

    Router::new(Stitch::Unary)
      .from(["s2"])
      .to(["t2"])
      .route(&mut pipeline)
      .expect("s2 outputs are still free");
    assert_eq!(pipeline.routes().len(), 1);
  }

  /// Test: the connect primitive checks the sink's arity before attaching the source.
  #[test]
  fn test_connect_checks_both_sides_first() {
    let mut pipeline = Pipeline::new("connect");
    for address in ["s1", "s2", "t"] {
      pipeline
        .segment(address, LinearTransform::new(|value: u64| Ok(value + 1)))
        .expect("register");
    }

    let first = Stream::new(1);
    pipeline
      .connect(&Address::from("s1"), &Address::from("t"), &first)
      .expect("first input");
    let second = Stream::new(1);
    pipeline
      .connect(&Address::from("s2"), &Address::from("t"), &second)
      .expect_err("t is full");
    assert_eq!(pipeline.routes().len(), 1);

    let third = Stream::new(1);
    pipeline
      .connect(&Address::from("s2"), &Address::from("s1"), &third)
      .expect("s2 outputs were never attached");
  }

  #[test]
  fn test_registering_twice_replaces_and_forgets_routes() {
    let mut pipeline = two_by_two();
    Router::new(Stitch::Unary)
      .from(["s1"])
      .to(["t1"])
      .route(&mut pipeline)
      .expect("route");

    pipeline.segment("t1", relay()).expect("re-register");
    assert_eq!(pipeline.addresses().len(), 4);
    assert!(pipeline.routes().is_empty());
  }

  // ==========================================================================
  // Sealing
  // ==========================================================================

  #[tokio::test]
  async fn test_flow_seals_the_pipeline() {
    let group = TaskGroup::new();
    let mut pipeline = Pipeline::new("sealed");
    pipeline.source("numbers", counter(2)).expect("register");
    let (sink, _) = collector();
    pipeline.sink("collect", sink).expect("register");
    Router::new(Stitch::Unary)
      .from(["numbers"])
      .to(["collect"])
      .route(&mut pipeline)
      .expect("route");

    pipeline
      .flow(&group, FlowOptions::new().close_inlets_on_exit(true))
      .expect("flow");
    assert!(pipeline.is_sealed());

    let err = pipeline.segment("late", relay()).expect_err("sealed");
    assert!(matches!(err, FlowError::Contract(ContractViolation::Sealed { .. })));
    let err = Router::new(Stitch::Unary)
      .from(["numbers"])
      .to(["collect"])
      .route(&mut pipeline)
      .expect_err("sealed");
    assert!(matches!(err, FlowError::Contract(ContractViolation::Sealed { .. })));
    let err = pipeline.flow(&group, FlowOptions::new()).expect_err("flows once");
    assert!(matches!(
      err,
      FlowError::Contract(ContractViolation::AlreadyFlowing { segment: "Pipeline" })
    ));

    group.wait_on_all().await.expect("clean exit");
  }

  #[tokio::test]
  async fn test_segment_flow_failure_cancels_group() {
    let group = TaskGroup::new();
    let mut pipeline = Pipeline::new("broken");
    let (sink, _) = collector();
    pipeline.sink("unwired", sink).expect("register");

    let err = pipeline.flow(&group, FlowOptions::new()).expect_err("sink has no input");
    assert!(matches!(err, FlowError::Contract(ContractViolation::TooFew { .. })));
    assert!(group.is_cancelled());
  }
}
