use anyhow::Result;
use aws_sdk_s3::primitives::ByteStream;
use tracing::info;

/// S3 key for a document's immutable text snapshot.
pub fn document_key(user_id: &str, doc_id: &str) -> String {
    format!("documents/{user_id}/{doc_id}.txt")
}

/// Uploads the extracted text snapshot. The Postgres row is the source of
/// truth for reads; the snapshot exists for export and reprocessing.
pub async fn put_document_snapshot(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    user_id: &str,
    doc_id: &str,
    text: &str,
) -> Result<String> {
    let key = document_key(user_id, doc_id);
    s3.put_object()
        .bucket(bucket)
        .key(&key)
        .body(ByteStream::from(text.as_bytes().to_vec()))
        .content_type("text/plain; charset=utf-8")
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("S3 upload failed: {e}"))?;

    info!("Uploaded document snapshot to s3://{}/{}", bucket, key);
    Ok(key)
}
