//! Request routing for the dynamic-table CRUD surface.
//!
//! # Responsibility
//! - Match method + path against the seven route shapes.
//! - Run the matching `TableService` operation on a per-request connection.
//! - Map outcomes to status codes and JSON bodies.
//!
//! # Invariants
//! - Table-name validity, then table existence, are checked before path ids
//!   or request bodies are interpreted.
//! - Every response carries the request id that tagged its log records.
//! - No operation is retried.

use crate::catalog::SchemaCache;
use crate::config::EngineConfig;
use crate::db::{open_db, ExecutionKind};
use crate::logging::sanitize_message;
use crate::model::record::{DynamicRecord, FieldSet};
use crate::model::table_name::NameValidator;
use crate::model::validation::ValidationError;
use crate::repo::{RepoError, RepoResult, SqliteTableStore};
use crate::service::table_service::{TableService, TableStore};
use log::{error, info, warn};
use percent_encoding::percent_decode_str;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const MAX_LOGGED_ERROR_CHARS: usize = 240;

/// HTTP method as seen by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Other(String),
}

impl Method {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Other(raw) => raw,
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One matched route. Table names and id segments are kept raw; they are
/// interpreted in check order during dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `GET /{table}`
    List { table: String },
    /// `POST /{table}`
    Insert { table: String },
    /// `GET /{table}/{id}`
    GetById { table: String, id: String },
    /// `PUT /{table}/{id}`
    UpdateById { table: String, id: String },
    /// `DELETE /{table}/{id}`
    DeleteById { table: String, id: String },
    /// `GET /{table}/Course/{id}`
    ByForeignKey { table: String, value: String },
    /// `PUT /{table}/Course/{courseId}/TraineeId/{traineeId}`
    UpdateByCompoundKey {
        table: String,
        key_value: String,
        second_value: String,
    },
}

/// Path or method that matches no route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    NoRoute,
    MethodNotAllowed { allowed: &'static str },
}

impl Display for RouteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRoute => write!(f, "no route"),
            Self::MethodNotAllowed { allowed } => {
                write!(f, "method not allowed; expected one of {allowed}")
            }
        }
    }
}

impl Route {
    /// Matches `path` (query string ignored) under the configured prefix.
///
/// Segments are percent-decoded before matching; a segment that does not
/// decode to UTF-8 matches no route.
    pub fn parse(method: &Method, path: &str, config: &EngineConfig) -> Result<Self, RouteError> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let rest = strip_prefix_ignore_case(path, config.normalized_route_prefix())
            .ok_or(RouteError::NoRoute)?;
        let rest = rest.strip_prefix('/').ok_or(RouteError::NoRoute)?;

        // Split before decoding so an escaped `/` stays inside its segment.
        let decoded = rest
            .strip_suffix('/')
            .unwrap_or(rest)
            .split('/')
            .map(|segment| {
                percent_decode_str(segment)
                    .decode_utf8()
                    .map(|value| value.into_owned())
                    .map_err(|_| RouteError::NoRoute)
            })
            .collect::<Result<Vec<String>, RouteError>>()?;
        let segments: Vec<&str> = decoded.iter().map(String::as_str).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(RouteError::NoRoute);
        }

        match segments.as_slice() {
            [table] => match method {
                Method::Get => Ok(Self::List { table: table.to_string() }),
                Method::Post => Ok(Self::Insert { table: table.to_string() }),
                _ => Err(RouteError::MethodNotAllowed {
                    allowed: "GET, POST",
                }),
            },
            [table, key, value] if config.foreign_key.matches(key) => match method {
                Method::Get => Ok(Self::ByForeignKey {
                    table: table.to_string(),
                    value: value.to_string(),
                }),
                _ => Err(RouteError::MethodNotAllowed { allowed: "GET" }),
            },
            [table, id] => {
                let (table, id) = (table.to_string(), id.to_string());
                match method {
                    Method::Get => Ok(Self::GetById { table, id }),
                    Method::Put => Ok(Self::UpdateById { table, id }),
                    Method::Delete => Ok(Self::DeleteById { table, id }),
                    _ => Err(RouteError::MethodNotAllowed {
                        allowed: "GET, PUT, DELETE",
                    }),
                }
            }
            [table, key, key_value, second, second_value]
                if config.foreign_key.matches(key) && config.compound_key.matches(second) =>
            {
                match method {
                    Method::Put => Ok(Self::UpdateByCompoundKey {
                        table: table.to_string(),
                        key_value: key_value.to_string(),
                        second_value: second_value.to_string(),
                    }),
                    _ => Err(RouteError::MethodNotAllowed { allowed: "PUT" }),
                }
            }
            _ => Err(RouteError::NoRoute),
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Self::List { table }
            | Self::Insert { table }
            | Self::GetById { table, .. }
            | Self::UpdateById { table, .. }
            | Self::DeleteById { table, .. }
            | Self::ByForeignKey { table, .. }
            | Self::UpdateByCompoundKey { table, .. } => table,
        }
    }

    /// Stable operation id used in log records.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::List { .. } => "list",
            Self::Insert { .. } => "insert",
            Self::GetById { .. } => "get_by_id",
            Self::UpdateById { .. } => "update_by_id",
            Self::DeleteById { .. } => "delete_by_id",
            Self::ByForeignKey { .. } => "get_by_foreign_key",
            Self::UpdateByCompoundKey { .. } => "update_by_compound_key",
        }
    }
}

fn strip_prefix_ignore_case<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    let head = path.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        path.get(prefix.len()..)
    } else {
        None
    }
}

/// Incoming request, already detached from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    pub method: Method,
    pub path: String,
    pub body: Vec<u8>,
}

impl RouteRequest {
    pub fn new(method: Method, path: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method,
            path: path.into(),
            body: body.into(),
        }
    }
}

/// Transport-neutral response.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteResponse {
    pub status: u16,
    /// JSON body; `None` for 204.
    pub body: Option<Value>,
    /// `Location` value for 201 responses.
    pub location: Option<String>,
    pub request_id: Uuid,
}

impl RouteResponse {
    fn json(request_id: Uuid, status: u16, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
            location: None,
            request_id,
        }
    }

    fn no_content(request_id: Uuid) -> Self {
        Self {
            status: 204,
            body: None,
            location: None,
            request_id,
        }
    }

    fn error(request_id: Uuid, status: u16, kind: &str, message: String) -> Self {
        Self::json(request_id, status, json!({ "error": message, "kind": kind }))
    }
}

/// Maps a repository failure to its HTTP status.
pub fn status_for(err: &RepoError) -> u16 {
    match err {
        RepoError::Validation(_) => 400,
        RepoError::NotFound(_) => 404,
        RepoError::Db(db) => match db.kind() {
            ExecutionKind::Constraint => 409,
            ExecutionKind::Timeout | ExecutionKind::Connectivity => 503,
            ExecutionKind::Schema | ExecutionKind::Other => 500,
        },
        RepoError::InvalidData(_) => 500,
    }
}

fn kind_for(err: &RepoError) -> &'static str {
    match err {
        RepoError::Validation(_) => "validation",
        RepoError::NotFound(_) => "not_found",
        RepoError::Db(db) => db.kind().as_str(),
        RepoError::InvalidData(_) => "invalid_data",
    }
}

/// Successful outcome before JSON rendering.
enum Outcome {
    Records(Vec<DynamicRecord>),
    Record(DynamicRecord),
    Created { table: String, id: i64 },
    NoContent,
}

/// Shared per-process routing state.
///
/// Cheap to clone; clones share the schema cache.
#[derive(Debug, Clone)]
pub struct RequestRouter {
    config: Arc<EngineConfig>,
    validator: Arc<NameValidator>,
    cache: Arc<SchemaCache>,
    db_path: PathBuf,
}

impl RequestRouter {
    pub fn new(config: EngineConfig, db_path: impl Into<PathBuf>) -> Self {
        let validator = NameValidator::new(&config.table_prefix);
        Self {
            config: Arc::new(config),
            validator: Arc::new(validator),
            cache: Arc::new(SchemaCache::new()),
            db_path: db_path.into(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn schema_cache(&self) -> &SchemaCache {
        &self.cache
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Routes one request on a fresh connection to the configured database.
    pub fn dispatch(&self, request: &RouteRequest) -> RouteResponse {
        let request_id = Uuid::new_v4();
        let started_at = Instant::now();

        let route = match Route::parse(&request.method, &request.path, &self.config) {
            Ok(route) => route,
            Err(err) => return self.route_failure(request_id, request, err, started_at),
        };

        // Bad names never reach the database, not even to open it.
        if let Err(err) = self.validator.parse(route.table()) {
            return self.finish(request_id, request, &route, Err(err.into()), started_at);
        }

        let conn = match open_db(&self.db_path, self.config.busy_timeout()) {
            Ok(conn) => conn,
            Err(err) => {
                let err = RepoError::from(err);
                return self.finish(request_id, request, &route, Err(err), started_at);
            }
        };
        self.run_route(request_id, request, &route, &conn, started_at)
    }

    /// Routes one request on a caller-owned connection.
    pub fn dispatch_on(&self, conn: &Connection, request: &RouteRequest) -> RouteResponse {
        let request_id = Uuid::new_v4();
        let started_at = Instant::now();
        match Route::parse(&request.method, &request.path, &self.config) {
            Ok(route) => self.run_route(request_id, request, &route, conn, started_at),
            Err(err) => self.route_failure(request_id, request, err, started_at),
        }
    }

    /// Routes one request against an arbitrary store.
    pub fn dispatch_with<S: TableStore>(&self, store: S, request: &RouteRequest) -> RouteResponse {
        let request_id = Uuid::new_v4();
        let started_at = Instant::now();
        match Route::parse(&request.method, &request.path, &self.config) {
            Ok(route) => {
                let outcome = self.execute(store, &route, &request.body);
                self.finish(request_id, request, &route, outcome, started_at)
            }
            Err(err) => self.route_failure(request_id, request, err, started_at),
        }
    }

    fn run_route(
        &self,
        request_id: Uuid,
        request: &RouteRequest,
        route: &Route,
        conn: &Connection,
        started_at: Instant,
    ) -> RouteResponse {
        let store = SqliteTableStore::new(conn, self.config.catalog_schema.as_str());
        let outcome = self.execute(store, route, &request.body);
        self.finish(request_id, request, route, outcome, started_at)
    }

    fn execute<S: TableStore>(&self, store: S, route: &Route, body: &[u8]) -> RepoResult<Outcome> {
        let service = TableService::new(store, &self.config, &self.validator, &self.cache);
        let table = service.resolve(route.table())?;

        match route {
            Route::List { .. } => Ok(Outcome::Records(service.list_in(&table)?)),
            Route::GetById { id, .. } => {
                let id = parse_id(id)?;
                Ok(Outcome::Record(service.get_by_id_in(&table, id)?))
            }
            Route::ByForeignKey { value, .. } => {
                let value = parse_id(value)?;
                Ok(Outcome::Records(service.get_by_foreign_key_in(&table, value)?))
            }
            Route::Insert { .. } => {
                let fields = parse_body(body)?;
                let id = service.insert_into(&table, &fields)?;
                Ok(Outcome::Created {
                    table: table.schema.table().to_string(),
                    id,
                })
            }
            Route::UpdateById { id, .. } => {
                let id = parse_id(id)?;
                let fields = parse_body(body)?;
                service.update_by_id_in(&table, id, &fields)?;
                Ok(Outcome::NoContent)
            }
            Route::DeleteById { id, .. } => {
                let id = parse_id(id)?;
                service.delete_by_id_in(&table, id)?;
                Ok(Outcome::NoContent)
            }
            Route::UpdateByCompoundKey {
                key_value,
                second_value,
                ..
            } => {
                let key_value = parse_id(key_value)?;
                let second_value = parse_id(second_value)?;
                let fields = parse_body(body)?;
                let record =
                    service.update_by_compound_key_in(&table, key_value, second_value, &fields)?;
                Ok(Outcome::Record(record))
            }
        }
    }

    fn finish(
        &self,
        request_id: Uuid,
        request: &RouteRequest,
        route: &Route,
        outcome: RepoResult<Outcome>,
        started_at: Instant,
    ) -> RouteResponse {
        let response = match outcome {
            Ok(outcome) => self.render(request_id, outcome),
            Err(err) => {
                let status = status_for(&err);
                let kind = kind_for(&err);
                let message = err.to_string();
                let logged = sanitize_message(&message, MAX_LOGGED_ERROR_CHARS);
                if status >= 500 {
                    error!(
                        "event=request_done module=router status=error request_id={} method={} operation={} table={} http_status={} kind={} error=\"{}\" duration_ms={}",
                        request_id,
                        request.method,
                        route.operation(),
                        route.table(),
                        status,
                        kind,
                        logged,
                        started_at.elapsed().as_millis()
                    );
                } else {
                    warn!(
                        "event=request_done module=router status=rejected request_id={} method={} operation={} table={} http_status={} kind={} error=\"{}\" duration_ms={}",
                        request_id,
                        request.method,
                        route.operation(),
                        route.table(),
                        status,
                        kind,
                        logged,
                        started_at.elapsed().as_millis()
                    );
                }
                return RouteResponse::error(request_id, status, kind, message);
            }
        };

        info!(
            "event=request_done module=router status=ok request_id={} method={} operation={} table={} http_status={} duration_ms={}",
            request_id,
            request.method,
            route.operation(),
            route.table(),
            response.status,
            started_at.elapsed().as_millis()
        );
        response
    }

    fn render(&self, request_id: Uuid, outcome: Outcome) -> RouteResponse {
        match outcome {
            Outcome::Records(records) => RouteResponse::json(request_id, 200, json!(records)),
            Outcome::Record(record) => RouteResponse::json(request_id, 200, json!(record)),
            Outcome::Created { table, id } => RouteResponse {
                status: 201,
                body: Some(json!(id)),
                location: Some(format!(
                    "{}/{}/{}",
                    self.config.normalized_route_prefix(),
                    table,
                    id
                )),
                request_id,
            },
            Outcome::NoContent => RouteResponse::no_content(request_id),
        }
    }

    fn route_failure(
        &self,
        request_id: Uuid,
        request: &RouteRequest,
        err: RouteError,
        started_at: Instant,
    ) -> RouteResponse {
        let (status, kind) = match err {
            RouteError::NoRoute => (404, "no_route"),
            RouteError::MethodNotAllowed { .. } => (405, "method_not_allowed"),
        };
        warn!(
            "event=request_done module=router status=rejected request_id={} method={} path=\"{}\" http_status={} kind={} duration_ms={}",
            request_id,
            request.method,
            sanitize_message(&request.path, MAX_LOGGED_ERROR_CHARS),
            status,
            kind,
            started_at.elapsed().as_millis()
        );
        RouteResponse::error(request_id, status, kind, err.to_string())
    }
}

/// Parses an id path segment as a 64-bit integer.
pub fn parse_id(raw: &str) -> Result<i64, ValidationError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ValidationError::InvalidIdentifier(raw.to_string()))
}

/// Parses a request body into a field set.
pub fn parse_body(body: &[u8]) -> Result<FieldSet, ValidationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ValidationError::InvalidPayload(
            "request body is empty".to_string(),
        ));
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|err| ValidationError::InvalidPayload(format!("malformed JSON: {err}")))?;
    FieldSet::from_json(value)
}

#[cfg(test)]
mod tests {
    use super::{parse_body, parse_id, status_for, Method, Route, RouteError};
    use crate::config::EngineConfig;
    use crate::db::DbError;
    use crate::model::validation::ValidationError;
    use crate::repo::{NotFound, RepoError};
    use rusqlite::ffi;

    fn parse(method: Method, path: &str) -> Result<Route, RouteError> {
        Route::parse(&method, path, &EngineConfig::default())
    }

    #[test]
    fn parses_all_route_shapes() {
        assert_eq!(
            parse(Method::Get, "/api/GenericActivity/Act_Swim").unwrap(),
            Route::List {
                table: "Act_Swim".to_string()
            }
        );
        assert_eq!(
            parse(Method::Post, "/api/GenericActivity/Act_Swim/").unwrap(),
            Route::Insert {
                table: "Act_Swim".to_string()
            }
        );
        assert_eq!(
            parse(Method::Delete, "/api/GenericActivity/Act_Swim/7").unwrap(),
            Route::DeleteById {
                table: "Act_Swim".to_string(),
                id: "7".to_string()
            }
        );
        assert_eq!(
            parse(Method::Get, "/api/genericactivity/Act_Swim/course/3?x=1").unwrap(),
            Route::ByForeignKey {
                table: "Act_Swim".to_string(),
                value: "3".to_string()
            }
        );
        assert_eq!(
            parse(Method::Put, "/api/GenericActivity/Act_Swim/Course/1/TraineeId/2").unwrap(),
            Route::UpdateByCompoundKey {
                table: "Act_Swim".to_string(),
                key_value: "1".to_string(),
                second_value: "2".to_string()
            }
        );
    }

    #[test]
    fn segments_are_percent_decoded_before_matching() {
        assert_eq!(
            parse(Method::Get, "/api/GenericActivity/Act_Swim%20Relay/%37").unwrap(),
            Route::GetById {
                table: "Act_Swim Relay".to_string(),
                id: "7".to_string()
            }
        );
        assert_eq!(
            parse(Method::Get, "/api/GenericActivity/Act_Swim/%43ourse/3").unwrap(),
            Route::ByForeignKey {
                table: "Act_Swim".to_string(),
                value: "3".to_string()
            }
        );
        // An escaped slash stays inside its segment.
        assert_eq!(
            parse(Method::Get, "/api/GenericActivity/Act_A%2FB").unwrap(),
            Route::List {
                table: "Act_A/B".to_string()
            }
        );
        assert_eq!(
            parse(Method::Get, "/api/GenericActivity/Act_%FF"),
            Err(RouteError::NoRoute)
        );
    }

    #[test]
    fn unknown_shapes_and_methods_are_rejected() {
        assert_eq!(
            parse(Method::Get, "/other/Act_Swim").unwrap_err(),
            RouteError::NoRoute
        );
        assert_eq!(
            parse(Method::Get, "/api/GenericActivity").unwrap_err(),
            RouteError::NoRoute
        );
        assert_eq!(
            parse(Method::Get, "/api/GenericActivity/Act_Swim/a/b/c").unwrap_err(),
            RouteError::NoRoute
        );
        assert!(matches!(
            parse(Method::Delete, "/api/GenericActivity/Act_Swim").unwrap_err(),
            RouteError::MethodNotAllowed { .. }
        ));
        assert_eq!(
            parse(Method::Post, "/api/GenericActivity/Act_Swim/1").unwrap_err(),
            RouteError::MethodNotAllowed {
                allowed: "GET, PUT, DELETE"
            }
        );
        assert_eq!(
            parse(Method::Get, "/api/GenericActivity/Act_Swim/Course/1/TraineeId/2").unwrap_err(),
            RouteError::MethodNotAllowed { allowed: "PUT" }
        );
        assert_eq!(Method::parse("patch"), Method::Other("PATCH".to_string()));
    }

    #[test]
    fn id_segments_must_be_integers() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert_eq!(
            parse_id("abc").unwrap_err(),
            ValidationError::InvalidIdentifier("abc".to_string())
        );
    }

    #[test]
    fn bodies_must_be_json_objects() {
        assert!(matches!(
            parse_body(b"{not json").unwrap_err(),
            ValidationError::InvalidPayload(_)
        ));
        assert!(matches!(
            parse_body(b"[1,2]").unwrap_err(),
            ValidationError::InvalidPayload(_)
        ));
        assert!(matches!(
            parse_body(b"  ").unwrap_err(),
            ValidationError::InvalidPayload(_)
        ));
        let fields = parse_body(br#"{"Score": 8.5}"#).unwrap();
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn errors_map_to_statuses() {
        let constraint = RepoError::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_CONSTRAINT),
            Some("UNIQUE constraint failed".to_string()),
        )));
        let busy = RepoError::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_BUSY),
            None,
        )));

        assert_eq!(
            status_for(&RepoError::Validation(ValidationError::InvalidPayload(
                "x".to_string()
            ))),
            400
        );
        assert_eq!(
            status_for(&RepoError::NotFound(NotFound::Table("Act_X".to_string()))),
            404
        );
        assert_eq!(status_for(&constraint), 409);
        assert_eq!(status_for(&busy), 503);
        assert_eq!(status_for(&RepoError::InvalidData("blob".to_string())), 500);
    }
}
