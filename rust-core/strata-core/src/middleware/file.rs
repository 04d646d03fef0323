//! File uploads: a CSV or JSON file sent as the `file` part of a
//! `multipart/form-data` request.

use crate::api_error::ApiError;
use crate::context::HandlerContext;
use crate::error::Error;
use crate::handler::Handler;
use crate::json::parse_json_bytes;
use crate::optional::Optional;
use crate::request::Request;
use crate::validation::Validate;
use hyper::body::Bytes;
use serde::de::DeserializeOwned;

/// Form field holding the uploaded file
pub const FILE_FIELD: &str = "file";

/// Decode an uploaded CSV file into `ctx.body`, one `Row` per data line
///
/// The first line is the header; columns map to `Row` fields by name.
/// The raw file is kept in `ctx.body_raw`.
///
/// Errors (all 400):
/// - `Failed to parse multipart form` when the body is not multipart
/// - `Missing or invalid 'file' field in form data`
/// - `File must be a CSV file (.csv)`
/// - `Failed to parse CSV file` when a row does not decode
/// - `CSV file is empty or contains no valid data rows`
/// - `CSV validation failed` with one field entry per failing cell,
///   keyed `row <line>.<field>` where line 2 is the first data row
pub fn parse_csv<P, Row, R>(next: Handler<P, Vec<Row>, R>) -> Handler<P, Vec<Row>, R>
where
    P: Send + 'static,
    Row: DeserializeOwned + Validate + Send + 'static,
    R: Send + 'static,
{
    Handler::new(move |mut ctx: HandlerContext<P, Vec<Row>>| {
        let next = next.clone();
        async move {
            let data = read_upload(&ctx.request, ".csv", "File must be a CSV file (.csv)").await?;
            let rows = decode_rows::<Row>(&data)?;
            if rows.is_empty() {
                return Err(
                    ApiError::bad_request("CSV file is empty or contains no valid data rows").into(),
                );
            }
            validate_rows(&rows)?;
            ctx.body_raw = Optional::of(data);
            ctx.body = Optional::of(rows);
            next.call(ctx).await
        }
    })
}

/// Decode an uploaded JSON file into `ctx.body`
///
/// The raw file is kept in `ctx.body_raw`.
///
/// Errors (all 400):
/// - `Failed to parse multipart form` when the body is not multipart
/// - `Missing or invalid 'file' field in form data`
/// - `File must be a JSON file (.json)`
/// - `Failed to parse JSON file` for malformed JSON
/// - `JSON validation failed` with per-field messages
pub fn parse_json_file<P, B, R>(next: Handler<P, B, R>) -> Handler<P, B, R>
where
    P: Send + 'static,
    B: DeserializeOwned + Validate + Send + 'static,
    R: Send + 'static,
{
    Handler::new(move |mut ctx: HandlerContext<P, B>| {
        let next = next.clone();
        async move {
            let data =
                read_upload(&ctx.request, ".json", "File must be a JSON file (.json)").await?;
            let mut bytes = data.to_vec();
            let body: B = parse_json_bytes(&mut bytes).map_err(|e| {
                let reason = match e {
                    Error::JsonParse { reason } => reason,
                    other => other.to_string(),
                };
                ApiError::bad_request("Failed to parse JSON file").with_detail(reason)
            })?;
            body.validate()
                .map_err(|errors| errors.into_api_error("JSON validation failed"))?;
            ctx.body_raw = Optional::of(data);
            ctx.body = Optional::of(body);
            next.call(ctx).await
        }
    })
}

/// Contents of the `file` part, checked against `extension`
async fn read_upload(
    request: &Request,
    extension: &str,
    wrong_type: &str,
) -> Result<Bytes, ApiError> {
    let malformed =
        |e: multer::Error| ApiError::bad_request("Failed to parse multipart form").with_detail(e.to_string());

    let content_type = request.header("content-type").unwrap_or_default();
    let boundary = multer::parse_boundary(content_type).map_err(malformed)?;
    let body = request.body().clone();
    let stream = futures_util::stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_ascii_lowercase) else {
            break;
        };
        if !file_name.ends_with(extension) {
            return Err(ApiError::bad_request(wrong_type));
        }
        return field.bytes().await.map_err(malformed);
    }
    Err(ApiError::bad_request("Missing or invalid 'file' field in form data"))
}

fn decode_rows<Row: DeserializeOwned>(data: &[u8]) -> Result<Vec<Row>, ApiError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data)
        .deserialize::<Row>()
        .collect::<Result<Vec<Row>, csv::Error>>()
        .map_err(|e| ApiError::bad_request("Failed to parse CSV file").with_detail(e.to_string()))
}

fn validate_rows<Row: Validate>(rows: &[Row]) -> Result<(), ApiError> {
    let mut error = ApiError::bad_request("CSV validation failed");
    for (index, row) in rows.iter().enumerate() {
        if let Err(errors) = row.validate() {
            let line = index + 2;
            for field_error in errors.errors {
                error.add_field(format!("row {line}.{}", field_error.field), field_error.message);
            }
        }
    }
    if error.fields.is_empty() {
        Ok(())
    } else {
        Err(error)
    }
}
