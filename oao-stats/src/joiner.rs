// Bounded preview join of requests against their results

use crate::decoder::decode_payload;
use crate::models::{JoinedPreviewEntry, RequestRecord, ResultRecord};

/// Join the first `preview_size` requests with their results.
///
/// When several results share a request id the first one in fetch order
/// wins.
pub fn join_preview(
    requests: &[RequestRecord],
    results: &[ResultRecord],
    preview_size: usize,
) -> Vec<JoinedPreviewEntry> {
    requests
        .iter()
        .take(preview_size)
        .map(|request| {
            let output = results
                .iter()
                .find(|result| result.request_id == request.request_id)
                .map(|result| decode_payload(&result.output));

            JoinedPreviewEntry {
                request_id: request.request_id.clone(),
                model_id: request.model_id.clone(),
                input: decode_payload(&request.input),
                output,
            }
        })
        .collect()
}
