use std::sync::Arc;
use std::thread;

use pipeline::{
    CompositeContinuationToken, ContinuationToken, DataRequest, ParallelQueryEngine,
    PartitionKeyRangeId, PartitionKeyRangeProperties, PartitionedPipeline, PipelineError,
    PipelineResult, QueryEngine, QueryPipeline,
};

fn two_ranges() -> Vec<PartitionKeyRangeProperties> {
    vec![
        PartitionKeyRangeProperties::new("A", "", "80").unwrap(),
        PartitionKeyRangeProperties::new("B", "80", "FF").unwrap(),
    ]
}

fn request(partition: &str, continuation: Option<&str>) -> DataRequest {
    DataRequest {
        partition_id: PartitionKeyRangeId::new(partition).unwrap(),
        continuation: continuation.and_then(ContinuationToken::new),
    }
}

fn item(id: &str) -> Vec<u8> {
    format!(r#"{{"id":"{id}"}}"#).into_bytes()
}

#[test]
fn two_partitions_are_read_to_completion() {
    let pipeline = PartitionedPipeline::for_query("SELECT * FROM c", &two_ranges()).unwrap();

    let first = pipeline.next_batch(10).unwrap();
    assert!(!first.is_completed);
    assert!(first.items.is_empty());
    assert_eq!(first.requests, vec![request("A", None), request("B", None)]);

    pipeline
        .provide_data("A", br#"[{"id":"item1"},{"id":"item2"}]"#, None)
        .unwrap();
    pipeline
        .provide_data("B", br#"{"_rid":"r","Documents":[{"id":"item3"}],"_count":1}"#, Some("c1"))
        .unwrap();

    let second = pipeline.next_batch(10).unwrap();
    assert!(!second.is_completed);
    assert_eq!(second.items, vec![item("item1"), item("item2"), item("item3")]);
    assert_eq!(second.requests, vec![request("B", Some("c1"))]);

    pipeline.provide_data("B", b"[]", None).unwrap();

    let last = pipeline.next_batch(10).unwrap();
    assert_eq!(last, PipelineResult::COMPLETED);
    assert!(pipeline.is_complete().unwrap());
}

#[test]
fn a_partition_is_never_asked_twice_before_answering() {
    let pipeline = PartitionedPipeline::for_query("q", &two_ranges()).unwrap();
    assert_eq!(pipeline.next_batch(10).unwrap().requests.len(), 2);

    // Both requests are in flight.
    let waiting = pipeline.next_batch(10).unwrap();
    assert!(!waiting.is_completed);
    assert!(waiting.items.is_empty());
    assert!(waiting.requests.is_empty());

    pipeline.provide_data("A", b"[]", Some("a1")).unwrap();
    let turn = pipeline.next_batch(10).unwrap();
    assert_eq!(turn.requests, vec![request("A", Some("a1"))]);
    assert!(pipeline.next_batch(10).unwrap().requests.is_empty());
}

#[test]
fn completion_is_sticky() {
    let pipeline = PartitionedPipeline::for_query("q", &two_ranges()[..1]).unwrap();
    pipeline.next_batch(10).unwrap();
    pipeline.provide_data("A", b"[1]", None).unwrap();

    let delivering = pipeline.next_batch(10).unwrap();
    assert_eq!(delivering.items, vec![b"1".to_vec()]);
    assert!(!delivering.is_completed);

    for _ in 0..3 {
        assert_eq!(pipeline.next_batch(10).unwrap(), PipelineResult::COMPLETED);
        assert!(pipeline.is_complete().unwrap());
    }
}

#[test]
fn data_after_the_final_page_is_ignored() {
    let pipeline = PartitionedPipeline::for_query("q", &two_ranges()[..1]).unwrap();
    pipeline.next_batch(10).unwrap();
    pipeline.provide_data("A", b"[]", None).unwrap();

    pipeline.provide_data("A", b"[1,2,3]", Some("late")).unwrap();
    assert_eq!(pipeline.next_batch(10).unwrap(), PipelineResult::COMPLETED);
}

#[test]
fn every_item_is_delivered_exactly_once() {
    let pipeline = PartitionedPipeline::for_query("q", &two_ranges()).unwrap();
    let pages_a: [&[u8]; 2] = [b"[1,2,3]", b"[4]"];
    let pages_b: [&[u8]; 3] = [b"[10]", b"[]", b"[11,12]"];

    let mut delivered = Vec::new();
    let (mut next_a, mut next_b) = (0, 0);
    loop {
        let turn = pipeline.next_batch(2).unwrap();
        delivered.extend(turn.items);
        if turn.is_completed {
            break;
        }
        for req in turn.requests {
            match req.partition_id.as_str() {
                "A" => {
                    let more = (next_a + 1 < pages_a.len()).then(|| format!("a{next_a}"));
                    pipeline
                        .provide_data("A", pages_a[next_a], more.as_deref())
                        .unwrap();
                    next_a += 1;
                }
                _ => {
                    let more = (next_b + 1 < pages_b.len()).then(|| format!("b{next_b}"));
                    pipeline
                        .provide_data("B", pages_b[next_b], more.as_deref())
                        .unwrap();
                    next_b += 1;
                }
            }
        }
    }

    let delivered: Vec<String> = delivered
        .into_iter()
        .map(|bytes| String::from_utf8(bytes).unwrap())
        .collect();
    assert_eq!(delivered, vec!["1", "2", "3", "10", "4", "11", "12"]);
}

#[test]
fn closed_pipeline_rejects_every_call() {
    let pipeline = PartitionedPipeline::for_query("q", &two_ranges()).unwrap();
    pipeline.next_batch(10).unwrap();
    pipeline.provide_data("A", b"[1]", None).unwrap();

    pipeline.close();
    pipeline.close();

    assert_eq!(pipeline.next_batch(10).unwrap_err(), PipelineError::Closed);
    assert_eq!(pipeline.provide_data("B", b"[]", None).unwrap_err(), PipelineError::Closed);
    assert_eq!(pipeline.query().unwrap_err(), PipelineError::Closed);
    assert_eq!(pipeline.is_complete().unwrap_err(), PipelineError::Closed);
}

#[test]
fn unknown_partition_is_rejected() {
    let pipeline = PartitionedPipeline::for_query("q", &two_ranges()).unwrap();
    assert_eq!(
        pipeline.provide_data("Z", b"[]", None).unwrap_err(),
        PipelineError::UnknownPartition {
            partition_id: "Z".into()
        }
    );
}

#[test]
fn resumes_from_a_composite_token() {
    let pipeline = PartitionedPipeline::for_query("q", &two_ranges()).unwrap();
    pipeline.next_batch(10).unwrap();
    pipeline.provide_data("A", b"[1]", None).unwrap();
    pipeline.provide_data("B", b"[2]", Some("b1")).unwrap();
    pipeline.next_batch(10).unwrap();

    // A is exhausted; B resumes at b1.
    let token = pipeline.continuation_token(None).unwrap();
    let json = token.to_json().unwrap();
    let parsed = CompositeContinuationToken::from_json(&json).unwrap();
    assert_eq!(parsed.continuation.len(), 1);

    let resumed = PartitionedPipeline::resume("q", &parsed, &two_ranges()).unwrap();
    assert_eq!(
        resumed.next_batch(10).unwrap().requests,
        vec![request("B", Some("b1"))]
    );
}

#[test]
fn resuming_after_a_split_fails_with_not_found() {
    let pipeline = PartitionedPipeline::for_query("q", &two_ranges()).unwrap();
    let token = pipeline.continuation_token(None).unwrap();

    let split = vec![
        PartitionKeyRangeProperties::new("C", "", "40").unwrap(),
        PartitionKeyRangeProperties::new("D", "40", "80").unwrap(),
        PartitionKeyRangeProperties::new("B", "80", "FF").unwrap(),
    ];
    assert!(matches!(
        PartitionedPipeline::resume("q", &token, &split),
        Err(PipelineError::NotFound { .. })
    ));
}

#[test]
fn empty_token_resumes_to_a_finished_pipeline() {
    let token = CompositeContinuationToken::new(None, Vec::new());
    let pipeline = PartitionedPipeline::resume("q", &token, &two_ranges()).unwrap();
    assert!(pipeline.is_complete().unwrap());
    assert_eq!(pipeline.next_batch(10).unwrap(), PipelineResult::COMPLETED);
}

#[test]
fn partitions_can_be_answered_from_many_threads() {
    let ranges: Vec<_> = (0..8)
        .map(|i| {
            PartitionKeyRangeProperties::new(
                i.to_string(),
                format!("{:02X}", i * 16),
                format!("{:02X}", (i + 1) * 16),
            )
            .unwrap()
        })
        .collect();
    let engine = ParallelQueryEngine::new();
    let pipeline: Arc<dyn QueryPipeline> =
        Arc::from(engine.create_pipeline("SELECT * FROM c", b"", &ranges).unwrap());

    let requests = pipeline.next_batch(100).unwrap().requests;
    assert_eq!(requests.len(), 8);

    let handles: Vec<_> = requests
        .into_iter()
        .map(|req| {
            let pipeline = Arc::clone(&pipeline);
            thread::spawn(move || {
                let id = req.partition_id.into_inner();
                let body = format!("[{id},{id}]");
                pipeline.provide_data(&id, body.as_bytes(), None).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let turn = pipeline.next_batch(100).unwrap();
    assert_eq!(turn.items.len(), 16);
    assert!(turn.requests.is_empty());
    assert_eq!(turn.items[0], b"0".to_vec());
    assert_eq!(turn.items[15], b"7".to_vec());
    assert_eq!(pipeline.next_batch(100).unwrap(), PipelineResult::COMPLETED);
}
