use dyntable_core::db::open_db_in_memory;
use dyntable_core::{
    ColumnDescriptor, CompoundKey, DynamicRecord, EmptyListing, EngineConfig, FieldSet,
    NameValidator, NotFound, ReadOptions, RecordReader, RecordWriter, RepoError, RepoResult,
    RowPredicate, Scalar, SchemaCache, SchemaCatalog, SqliteTableStore, TableName, TableSchema,
    TableService, ValidationError,
};
use rusqlite::Connection;
use std::cell::Cell;

const SWIM_DDL: &str = "CREATE TABLE Act_Swim (
    Id INTEGER PRIMARY KEY AUTOINCREMENT,
    CourseId INT NOT NULL,
    TraineeId INT NOT NULL,
    Score DECIMAL(5,2)
);";

struct Fixture {
    conn: Connection,
    config: EngineConfig,
    validator: NameValidator,
    cache: SchemaCache,
}

impl Fixture {
    fn new(config: EngineConfig) -> Self {
        let conn = open_db_in_memory().unwrap();
        conn.execute_batch(SWIM_DDL).unwrap();
        let validator = NameValidator::new(&config.table_prefix);
        Self {
            conn,
            config,
            validator,
            cache: SchemaCache::new(),
        }
    }

    fn service(&self) -> TableService<'_, SqliteTableStore<'_>> {
        TableService::new(
            SqliteTableStore::new(&self.conn, "main"),
            &self.config,
            &self.validator,
            &self.cache,
        )
    }

    fn seed(&self, course: i64, trainee: i64) {
        self.conn
            .execute(
                "INSERT INTO Act_Swim (CourseId, TraineeId, Score) VALUES (?1, ?2, 1)",
                [course, trainee],
            )
            .unwrap();
    }
}

fn fields(body: serde_json::Value) -> FieldSet {
    FieldSet::from_json(body).unwrap()
}

/// Store that counts every call and answers as if the database were empty.
#[derive(Default)]
struct CountingStore {
    calls: Cell<usize>,
}

impl CountingStore {
    fn touch(&self) {
        self.calls.set(self.calls.get() + 1);
    }
}

impl SchemaCatalog for &CountingStore {
    fn canonical_name(&self, _table: &TableName) -> RepoResult<Option<String>> {
        self.touch();
        Ok(None)
    }

    fn columns(&self, _table: &TableName) -> RepoResult<Vec<ColumnDescriptor>> {
        self.touch();
        Ok(Vec::new())
    }

    fn schema_version(&self) -> RepoResult<i64> {
        self.touch();
        Ok(1)
    }
}

impl RecordReader for &CountingStore {
    fn list_all(&self, _schema: &TableSchema, _cap: u32) -> RepoResult<Vec<DynamicRecord>> {
        self.touch();
        Ok(Vec::new())
    }

    fn by_id(
        &self,
        _schema: &TableSchema,
        _id: i64,
        _options: ReadOptions,
    ) -> RepoResult<Option<DynamicRecord>> {
        self.touch();
        Ok(None)
    }

    fn by_foreign_key(
        &self,
        _schema: &TableSchema,
        _column: &str,
        _value: &Scalar,
        _cap: u32,
    ) -> RepoResult<Vec<DynamicRecord>> {
        self.touch();
        Ok(Vec::new())
    }

    fn by_compound_key(
        &self,
        _schema: &TableSchema,
        _key: &CompoundKey,
    ) -> RepoResult<Option<DynamicRecord>> {
        self.touch();
        Ok(None)
    }
}

impl RecordWriter for &CountingStore {
    fn insert(&self, _schema: &TableSchema, _fields: &FieldSet) -> RepoResult<i64> {
        self.touch();
        Ok(1)
    }

    fn update(
        &self,
        _schema: &TableSchema,
        _predicate: &RowPredicate,
        _fields: &FieldSet,
    ) -> RepoResult<usize> {
        self.touch();
        Ok(0)
    }

    fn delete(&self, _schema: &TableSchema, _id: i64) -> RepoResult<usize> {
        self.touch();
        Ok(0)
    }
}

#[test]
fn invalid_names_never_reach_the_store() {
    let config = EngineConfig::default();
    let validator = NameValidator::new(&config.table_prefix);
    let cache = SchemaCache::new();
    let store = CountingStore::default();
    let service = TableService::new(&store, &config, &validator, &cache);
    let body = fields(serde_json::json!({ "CourseId": 1 }));

    for name in ["", "Swim", "Users", "xAct_Swim", "Ac_Swim"] {
        assert!(matches!(
            service.list(name).unwrap_err(),
            RepoError::Validation(ValidationError::InvalidTableName { .. })
        ));
        assert!(service.get_by_id(name, 1).is_err());
        assert!(service.get_by_foreign_key(name, 1).is_err());
        assert!(service.insert(name, &body).is_err());
        assert!(service.update_by_id(name, 1, &body).is_err());
        assert!(service.update_by_compound_key(name, 1, 2, &body).is_err());
        assert!(service.delete_by_id(name, 1).is_err());
    }

    assert_eq!(store.calls.get(), 0);
}

#[test]
fn unknown_table_is_not_found_after_one_catalog_call() {
    let config = EngineConfig::default();
    let validator = NameValidator::new(&config.table_prefix);
    let cache = SchemaCache::new();
    let store = CountingStore::default();
    let service = TableService::new(&store, &config, &validator, &cache);

    let err = service.list("Act_Missing").unwrap_err();
    assert!(matches!(err, RepoError::NotFound(NotFound::Table(_))));
    assert_eq!(store.calls.get(), 1);
}

#[test]
fn foreign_key_miss_falls_back_to_full_listing() {
    let fixture = Fixture::new(EngineConfig::default());
    fixture.seed(1, 1);
    fixture.seed(1, 2);
    fixture.seed(2, 3);
    let service = fixture.service();

    let filtered = service.get_by_foreign_key("Act_Swim", 1).unwrap();
    assert_eq!(filtered.len(), 2);
    assert!(filtered
        .iter()
        .all(|record| record.get("CourseId") == Some(&Scalar::Integer(1))));

    let fallback = service.get_by_foreign_key("Act_Swim", 404).unwrap();
    assert_eq!(fallback.len(), 3);
}

#[test]
fn placeholder_mode_applies_to_listing_and_fallback() {
    let config = EngineConfig::builder()
        .empty_listing(EmptyListing::Placeholder)
        .build()
        .unwrap();
    let fixture = Fixture::new(config);
    let service = fixture.service();

    let listing = service.list("Act_Swim").unwrap();
    assert_eq!(listing.len(), 1);
    assert!(listing[0].is_all_null());

    let fallback = service.get_by_foreign_key("Act_Swim", 1).unwrap();
    assert_eq!(fallback.len(), 1);
    assert!(fallback[0].is_all_null());

    assert!(service.list_records("Act_Swim").unwrap().is_empty());
    assert_eq!(
        service.list_records_or_placeholder("Act_Swim").unwrap().len(),
        1
    );
}

#[test]
fn get_by_id_honors_identity_projection_option() {
    let fixture = Fixture::new(EngineConfig::default());
    let id = fixture
        .service()
        .insert(
            "Act_Swim",
            &fields(serde_json::json!({ "CourseId": 1, "TraineeId": 2, "Score": 8.5 })),
        )
        .unwrap();

    let record = fixture.service().get_by_id("act_swim", id).unwrap();
    assert!(record.get("Id").is_none());
    assert_eq!(record.get("CourseId"), Some(&Scalar::Integer(1)));

    let including = Fixture::new(
        EngineConfig::builder()
            .by_id_includes_identity(true)
            .build()
            .unwrap(),
    );
    let id = including
        .service()
        .insert("Act_Swim", &fields(serde_json::json!({ "CourseId": 1, "TraineeId": 2 })))
        .unwrap();
    let record = including.service().get_by_id("Act_Swim", id).unwrap();
    assert_eq!(record.get("Id"), Some(&Scalar::Integer(id)));
}

#[test]
fn missing_rows_are_not_found_before_any_mutation() {
    let fixture = Fixture::new(EngineConfig::default());
    let service = fixture.service();
    let body = fields(serde_json::json!({ "Score": 3 }));

    for err in [
        service.get_by_id("Act_Swim", 9).unwrap_err(),
        service.update_by_id("Act_Swim", 9, &body).unwrap_err(),
        service.delete_by_id("Act_Swim", 9).unwrap_err(),
        service
            .update_by_compound_key("Act_Swim", 1, 2, &body)
            .map(|_| ())
            .unwrap_err(),
    ] {
        assert!(matches!(err, RepoError::NotFound(NotFound::Row { .. })));
    }
}

#[test]
fn compound_key_update_returns_the_stored_row() {
    let fixture = Fixture::new(EngineConfig::default());
    fixture.seed(1, 2);
    let service = fixture.service();

    let record = service
        .update_by_compound_key(
            "Act_Swim",
            1,
            2,
            &fields(serde_json::json!({ "Score": "9.75", "CourseId": 5 })),
        )
        .unwrap();

    assert_eq!(record.get("CourseId"), Some(&Scalar::Integer(1)));
    assert_eq!(record.get("TraineeId"), Some(&Scalar::Integer(2)));
    match record.get("Score") {
        Some(Scalar::Decimal(score)) => assert_eq!(score.to_string(), "9.75"),
        other => panic!("unexpected score: {other:?}"),
    }
}

#[test]
fn empty_effective_field_set_is_a_validation_error() {
    let fixture = Fixture::new(EngineConfig::default());
    let service = fixture.service();

    let err = service
        .insert("Act_Swim", &fields(serde_json::json!({ "Bogus": 1, "Id": 3 })))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ValidationError::EmptyFieldSet { .. })
    ));
    assert!(service.list("Act_Swim").unwrap().is_empty());
}

#[test]
fn schema_cache_is_reused_and_invalidated() {
    let fixture = Fixture::new(EngineConfig::default());
    let service = fixture.service();

    service.list("Act_Swim").unwrap();
    service.list("ACT_SWIM").unwrap();
    assert_eq!(fixture.cache.len(), 1);

    fixture.conn.execute_batch("DROP TABLE Act_Swim;").unwrap();
    let err = service.list("Act_Swim").unwrap_err();
    assert!(matches!(err, RepoError::NotFound(NotFound::Table(_))));
    assert!(fixture.cache.is_empty());
}

#[test]
fn added_column_is_visible_on_the_next_request() {
    let fixture = Fixture::new(EngineConfig::default());
    let service = fixture.service();
    service.list("Act_Swim").unwrap();

    fixture
        .conn
        .execute_batch("ALTER TABLE Act_Swim ADD COLUMN Lane INT;")
        .unwrap();

    let id = service
        .insert(
            "Act_Swim",
            &fields(serde_json::json!({ "CourseId": 1, "TraineeId": 2, "Lane": 4 })),
        )
        .unwrap();
    let record = service.get_by_id("Act_Swim", id).unwrap();
    assert_eq!(record.get("Lane"), Some(&Scalar::Integer(4)));

    service
        .update_by_id("Act_Swim", id, &fields(serde_json::json!({ "Lane": 5 })))
        .unwrap();
    let record = service.get_by_id("Act_Swim", id).unwrap();
    assert_eq!(record.get("Lane"), Some(&Scalar::Integer(5)));
}

#[test]
fn rebuilt_table_is_reloaded_without_an_error() {
    let fixture = Fixture::new(EngineConfig::default());
    let service = fixture.service();
    service.list("Act_Swim").unwrap();

    fixture
        .conn
        .execute_batch(
            "DROP TABLE Act_Swim;
             CREATE TABLE Act_Swim (
                 Id INTEGER PRIMARY KEY AUTOINCREMENT,
                 CourseId INT NOT NULL,
                 TraineeId INT NOT NULL
             );",
        )
        .unwrap();

    assert!(service.list("Act_Swim").unwrap().is_empty());
    let resolved = service.resolve("Act_Swim").unwrap();
    assert!(resolved.schema.column("Score").is_none());
}

/// Real SQLite store whose catalog never reports a schema change.
struct FrozenCatalog<'conn>(SqliteTableStore<'conn>);

impl SchemaCatalog for FrozenCatalog<'_> {
    fn canonical_name(&self, table: &TableName) -> RepoResult<Option<String>> {
        self.0.canonical_name(table)
    }

    fn columns(&self, table: &TableName) -> RepoResult<Vec<ColumnDescriptor>> {
        self.0.columns(table)
    }

    fn schema_version(&self) -> RepoResult<i64> {
        Ok(0)
    }
}

impl RecordReader for FrozenCatalog<'_> {
    fn list_all(&self, schema: &TableSchema, cap: u32) -> RepoResult<Vec<DynamicRecord>> {
        self.0.list_all(schema, cap)
    }

    fn by_id(
        &self,
        schema: &TableSchema,
        id: i64,
        options: ReadOptions,
    ) -> RepoResult<Option<DynamicRecord>> {
        self.0.by_id(schema, id, options)
    }

    fn by_foreign_key(
        &self,
        schema: &TableSchema,
        column: &str,
        value: &Scalar,
        cap: u32,
    ) -> RepoResult<Vec<DynamicRecord>> {
        self.0.by_foreign_key(schema, column, value, cap)
    }

    fn by_compound_key(
        &self,
        schema: &TableSchema,
        key: &CompoundKey,
    ) -> RepoResult<Option<DynamicRecord>> {
        self.0.by_compound_key(schema, key)
    }
}

impl RecordWriter for FrozenCatalog<'_> {
    fn insert(&self, schema: &TableSchema, fields: &FieldSet) -> RepoResult<i64> {
        self.0.insert(schema, fields)
    }

    fn update(
        &self,
        schema: &TableSchema,
        predicate: &RowPredicate,
        fields: &FieldSet,
    ) -> RepoResult<usize> {
        self.0.update(schema, predicate, fields)
    }

    fn delete(&self, schema: &TableSchema, id: i64) -> RepoResult<usize> {
        self.0.delete(schema, id)
    }
}

#[test]
fn stale_cached_schema_is_evicted_on_schema_errors() {
    let fixture = Fixture::new(EngineConfig::default());
    let service = TableService::new(
        FrozenCatalog(SqliteTableStore::new(&fixture.conn, "main")),
        &fixture.config,
        &fixture.validator,
        &fixture.cache,
    );
    service.list("Act_Swim").unwrap();

    // Rebuild the table without the Score column behind the cache's back.
    fixture
        .conn
        .execute_batch(
            "DROP TABLE Act_Swim;
             CREATE TABLE Act_Swim (
                 Id INTEGER PRIMARY KEY AUTOINCREMENT,
                 CourseId INT NOT NULL,
                 TraineeId INT NOT NULL
             );",
        )
        .unwrap();

    let err = service.list("Act_Swim").unwrap_err();
    assert_eq!(
        err.execution_kind(),
        Some(dyntable_core::ExecutionKind::Schema)
    );
    assert!(fixture.cache.is_empty());

    let records = service.list("Act_Swim").unwrap();
    assert!(records.is_empty());
}
