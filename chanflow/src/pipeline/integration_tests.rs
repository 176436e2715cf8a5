//! End-to-end tests for composed pipelines.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::context::StageContext;
    use crate::errors::{PipelineError, TransformError};
    use crate::events::CollectingEventSink;
    use crate::pipeline::{
        compose, compose_in, source_from_iter, Driver, Pipeline, PipelineConfig, RunningPipeline,
        StageOutcome, WorkerState,
    };
    use crate::stages::{
        add, identity, multiply_by, AsyncMapStage, ErrorPolicy, FilterStage, FlatMapStage,
        MapStage, Stage, TryMapStage,
    };
    use crate::stream::channel;
    use crate::testing::{
        assert_stream_yields, collect_within, DelayStage, PanickingStage, RecordingStage,
    };
    use pretty_assertions::assert_eq;
    use rand::Rng;
    use std::sync::Arc;
    use std::time::Duration;

    const LIMIT: Duration = Duration::from_secs(5);

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Mul(i64),
        Add(i64),
    }

    impl Op {
        fn apply(self, value: i64) -> i64 {
            match self {
                Self::Mul(k) => value.wrapping_mul(k),
                Self::Add(k) => value.wrapping_add(k),
            }
        }

        fn stage(self) -> Arc<dyn Stage<i64>> {
            match self {
                Self::Mul(k) => Arc::new(multiply_by(k)),
                Self::Add(k) => Arc::new(add(k)),
            }
        }
    }

    fn random_case(rng: &mut impl Rng) -> (Vec<i64>, Vec<Op>) {
        let values = (0..rng.gen_range(0..40))
            .map(|_| rng.gen_range(-1000..1000))
            .collect();
        let ops = (0..rng.gen_range(0..6))
            .map(|_| {
                if rng.gen_bool(0.5) {
                    Op::Mul(rng.gen_range(-3..=3))
                } else {
                    Op::Add(rng.gen_range(-10..=10))
                }
            })
            .collect();
        (values, ops)
    }

    #[tokio::test]
    async fn test_spec_example_multiply_then_add() {
        let ctx = StageContext::detached();
        let stages: Vec<Arc<dyn Stage<i32>>> = vec![Arc::new(multiply_by(2)), Arc::new(add(5))];

        let out = compose(source_from_iter(vec![1, 2, 3], &ctx), &stages);
        assert_stream_yields(out, &[7, 9, 11], LIMIT).await;
    }

    #[tokio::test]
    async fn test_arithmetic_wraps_on_overflow() {
        let driver = Driver::new(
            Pipeline::<i64>::new("numbers")
                .stage(multiply_by(2))
                .stage(add(5)),
        );

        let report = driver.run(vec![1, i64::MAX, 3]).await.unwrap();
        assert_eq!(report.outputs, vec![7, 3, 11]);
        assert!(report
            .summary
            .stages
            .iter()
            .all(|r| r.outcome == StageOutcome::Drained));
    }

    #[tokio::test]
    async fn test_empty_input_closes_promptly() {
        let ctx = StageContext::detached();
        let stages: Vec<Arc<dyn Stage<i32>>> = vec![Arc::new(multiply_by(2))];

        let out = compose(source_from_iter(Vec::new(), &ctx), &stages);
        assert_stream_yields(out, &[], Duration::from_millis(500)).await;
    }

    #[tokio::test]
    async fn test_empty_stage_list_forwards_source() {
        let ctx = StageContext::detached();
        let out = compose(source_from_iter(vec![10], &ctx), &[]);
        assert_stream_yields(out, &[10], LIMIT).await;
    }

    #[tokio::test]
    async fn test_random_pipelines_match_function_composition() {
        let mut rng = rand::thread_rng();
        for _ in 0..25 {
            let (values, ops) = random_case(&mut rng);
            let expected: Vec<i64> = values
                .iter()
                .map(|&v| ops.iter().fold(v, |acc, op| op.apply(acc)))
                .collect();
            let stages: Vec<Arc<dyn Stage<i64>>> = ops.iter().map(|op| op.stage()).collect();

            let ctx = StageContext::detached();
            let mut out = compose_in(source_from_iter(values.clone(), &ctx), &stages, &ctx);
            let actual = collect_within(&mut out, LIMIT).await;

            // Same count in and out, then closure.
            assert_eq!(actual.len(), values.len());
            assert_eq!(actual, expected, "ops: {ops:?}");
            assert!(out.is_closed());

            let reports = ctx
                .pipeline()
                .workers()
                .join_all(ctx.cancel_token(), Some(LIMIT))
                .await
                .unwrap();
            assert_eq!(reports.len(), stages.len() + 1);
            assert!(reports.iter().all(|r| r.outcome == StageOutcome::Drained));
        }
    }

    #[tokio::test]
    async fn test_identity_stages_are_unobservable() {
        let mut rng = rand::thread_rng();
        let values: Vec<i64> = (0..30).map(|_| rng.gen()).collect();

        let report = Driver::new(
            Pipeline::<i64>::new("identity")
                .stage(identity())
                .stage(identity()),
        )
        .run(values.clone())
        .await
        .unwrap();
        assert_eq!(report.outputs, values);
    }

    #[tokio::test]
    async fn test_slow_consumer_keeps_order() {
        let pipeline = Pipeline::<u32>::new("slow-consumer").stage(add(1)).stage(add(1));
        let RunningPipeline { mut output, handle } = pipeline.compose_from_iter(0..20);

        let mut values = Vec::new();
        while let Some(value) = output.recv().await {
            tokio::time::sleep(Duration::from_millis(2)).await;
            values.push(value);
        }
        assert_eq!(values, (2..22).collect::<Vec<_>>());
        handle.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_slow_producer_keeps_order() {
        let pipeline = Pipeline::<u32>::new("slow-producer")
            .stage(DelayStage::with_delay_ms("delay", 3))
            .stage(multiply_by(3));

        let report = Driver::new(pipeline).run(0..10).await.unwrap();
        assert_eq!(report.outputs, (0..10).map(|n| n * 3).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_rendezvous_limits_work_ahead() {
        let recorder = Arc::new(RecordingStage::new("recorder"));
        let pipeline = Pipeline::<u64>::new("bounded").stage(Arc::clone(&recorder));
        let running = pipeline.compose_from_stream(
            futures::stream::iter(0u64..),
            Arc::new(CancellationToken::new()),
        );

        // Nobody reads the output; the recorder takes one element and waits.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(recorder.count(), 1);

        let (mut output, handle) = running.into_parts();
        assert_eq!(output.recv().await, Some(0));
        assert_eq!(output.recv().await, Some(1));
        drop(output);
        handle.join().await.unwrap();
        assert!(recorder.count() >= 2);
        assert_eq!(&recorder.seen()[..2], &[0, 1]);
    }

    #[tokio::test]
    async fn test_flat_map_and_filter_in_chain() {
        let pipeline = Pipeline::<u32>::new("expand")
            .stage(FlatMapStage::new("pairs", |n: u32| vec![n, n * 10]))
            .stage(FilterStage::new("small", |n: &u32| *n < 25));

        let report = Driver::new(pipeline).run(vec![1, 2, 3]).await.unwrap();
        assert_eq!(report.outputs, vec![1, 10, 2, 20, 3]);
        assert_eq!(report.summary.stages[2].received, 6);
        assert_eq!(report.summary.stages[2].emitted, 5);
    }

    #[tokio::test]
    async fn test_type_changing_chain() {
        let pipeline = Pipeline::<&'static str>::new("parse")
            .then(MapStage::new("len", str::len))
            .then(AsyncMapStage::new("describe", |n: usize| async move { format!("{n} chars") }));

        let report = Driver::new(pipeline).run(vec!["a", "abc"]).await.unwrap();
        assert_eq!(report.outputs, vec!["1 chars".to_string(), "3 chars".to_string()]);
    }

    #[tokio::test]
    async fn test_tagged_errors_flow_as_elements() {
        let pipeline = Pipeline::<i32>::new("tagged").then(MapStage::new("checked", |n: i32| {
            if n < 0 {
                Err(format!("{n} is negative"))
            } else {
                Ok(n * 2)
            }
        }));

        let report = Driver::new(pipeline).run(vec![1, -1, 2]).await.unwrap();
        assert_eq!(
            report.outputs,
            vec![Ok(2), Err("-1 is negative".to_string()), Ok(4)]
        );
    }

    #[tokio::test]
    async fn test_halt_surfaces_transform_error() {
        let pipeline = Pipeline::<i32>::new("halting")
            .stage(TryMapStage::new("no_negatives", |n: i32| {
                if n < 0 {
                    Err(TransformError::new(format!("{n} is negative")))
                } else {
                    Ok(n)
                }
            }))
            .stage(add(1));

        let err = Driver::new(pipeline).run(vec![1, -2, 3]).await.unwrap_err();
        match err {
            PipelineError::Transform(e) => {
                assert_eq!(e.stage, "no_negatives");
                assert_eq!(e.message, "-2 is negative");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_skip_counts_skipped_elements() {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = Pipeline::<i32>::new("skipping")
            .stage(
                TryMapStage::new("no_negatives", |n: i32| {
                    if n < 0 {
                        Err(TransformError::new("negative"))
                    } else {
                        Ok(n)
                    }
                })
                .with_policy(ErrorPolicy::Skip),
            )
            .with_event_sink(sink.clone());

        let report = Driver::new(pipeline).run(vec![1, -2, 3, -4]).await.unwrap();
        assert_eq!(report.outputs, vec![1, 3]);
        assert_eq!(report.summary.elements_in, 4);
        assert_eq!(report.summary.stages[1].skipped, 2);
        assert_eq!(sink.events_of_type("element.skipped").len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_frees_blocked_workers() {
        let pipeline = Pipeline::<u64>::new("cancel")
            .stage(add(1))
            .stage(add(1))
            .with_config(PipelineConfig::new().with_join_timeout(LIMIT));
        let running = pipeline.compose_from_stream(
            futures::stream::iter(0u64..),
            Arc::new(CancellationToken::new()),
        );

        // Every worker is now parked on an emit nobody will take.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let (output, handle) = running.into_parts();
        let ctx = Arc::clone(handle.context());
        assert!(handle.cancel("test over"));

        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled(ref reason) if reason == "test over"));
        assert!(ctx
            .workers()
            .states()
            .iter()
            .all(|(_, state)| *state == WorkerState::Closed));
        drop(output);
    }

    #[tokio::test]
    async fn test_external_token_cancels_driver_run() {
        let token = Arc::new(CancellationToken::new());
        let driver = Driver::new(Pipeline::<u64>::new("endless").stage(DelayStage::with_delay_ms("tick", 1)))
            .with_cancel_token(Arc::clone(&token));

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            token.cancel("deadline");
        });

        let err = driver
            .run_stream(futures::stream::iter(0u64..))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_shared_token_keeps_no_hooks_of_finished_runs() {
        let token = Arc::new(CancellationToken::new());
        let driver = Driver::new(Pipeline::<u64>::new("repeated").stage(add(1)))
            .with_cancel_token(Arc::clone(&token));

        for n in 0..200_u64 {
            let report = driver.run(vec![n]).await.unwrap();
            assert_eq!(report.outputs, vec![n + 1]);
            assert_eq!(token.callback_count(), 0);
        }

        let running = driver.pipeline().compose_from_stream(
            futures::stream::iter(0u64..),
            Arc::clone(&token),
        );
        assert_eq!(token.callback_count(), 1);
        drop(running);
        assert_eq!(token.callback_count(), 0);
    }

    #[tokio::test]
    async fn test_dropping_consumer_stops_every_worker() {
        let pipeline = Pipeline::<u64>::new("abandoned")
            .stage(multiply_by(2))
            .stage(add(1))
            .with_config(PipelineConfig::new().with_join_timeout(LIMIT));
        let (mut output, handle) = pipeline
            .compose_from_stream(futures::stream::iter(0u64..), Arc::new(CancellationToken::new()))
            .into_parts();

        assert_eq!(output.recv().await, Some(1));
        assert_eq!(output.recv().await, Some(3));
        drop(output);

        let reports = handle.join().await.unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports
            .iter()
            .all(|r| r.outcome == StageOutcome::Disconnected));
    }

    #[tokio::test]
    async fn test_worker_panic_is_reported() {
        let pipeline = Pipeline::<u32>::new("panicky")
            .stage(PanickingStage::new("fragile", 2))
            .stage(add(1));

        let err = Driver::new(pipeline).run(0..10).await.unwrap_err();
        match err {
            PipelineError::WorkerPanicked { stage, message } => {
                assert_eq!(stage, "fragile");
                assert!(message.contains("poisoned"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_join_timeout_aborts_stuck_worker() {
        let pipeline = Pipeline::<u32>::new("stuck")
            .stage(AsyncMapStage::new("forever", |n: u32| async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                n
            }))
            .with_config(PipelineConfig::new().with_join_timeout(Duration::from_millis(50)));

        let (output, handle) = pipeline.compose_from_iter(vec![1]).into_parts();
        drop(output);

        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, PipelineError::JoinTimeout { timeout_ms: 50, .. }));
    }

    #[tokio::test]
    async fn test_statuses_end_closed_and_events_balanced() {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = Pipeline::<i32>::new("observed")
            .stage(multiply_by(2))
            .stage(add(5))
            .with_event_sink(sink.clone());

        let (mut output, handle) = pipeline.compose_from_iter(vec![1, 2, 3]).into_parts();
        let ctx = Arc::clone(handle.context());
        assert_eq!(collect_within(&mut output, LIMIT).await, vec![7, 9, 11]);

        let reports = handle.join().await.unwrap();
        let names: Vec<&str> = reports.iter().map(|r| r.stage.as_str()).collect();
        assert_eq!(names, vec!["source", "multiply_by_2", "add_5"]);

        let states = ctx.workers().states();
        assert_eq!(states.len(), 3);
        assert!(states.iter().all(|(_, state)| *state == WorkerState::Closed));

        assert_eq!(sink.events_of_type("stage.started").len(), 3);
        assert_eq!(sink.events_of_type("stage.closed").len(), 3);
        assert!(sink.events_of_type("pipeline.cancelled").is_empty());
    }

    #[tokio::test]
    async fn test_close_twice_is_noop() {
        let (mut tx, mut rx) = channel::<u8>();
        assert!(tx.close());
        assert!(!tx.close());
        assert!(tx.is_closed());

        assert_eq!(rx.recv().await, None);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_dropped_handle_cancels_run() {
        let pipeline = Pipeline::<u64>::new("dropped").stage(add(1));
        let (output, handle) = pipeline
            .compose_from_stream(futures::stream::iter(0u64..), Arc::new(CancellationToken::new()))
            .into_parts();
        let ctx = Arc::clone(handle.context());

        drop(handle);
        assert!(ctx.cancel_token().is_cancelled());
        assert_eq!(ctx.cancel_token().reason().as_deref(), Some("pipeline handle dropped"));
        assert_eq!(ctx.cancel_token().callback_count(), 0);

        let err = ctx
            .workers()
            .join_all(ctx.cancel_token(), Some(LIMIT))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        drop(output);
    }
}
