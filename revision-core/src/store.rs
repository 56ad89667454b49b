use serde_json::{Map, Value};
use sqlx::{PgPool, Row};
use tracing::instrument;

use crate::errors::CoreResult;
use crate::id::DocId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
    pub upserted: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub n: u64,
}

#[derive(Debug, Clone, Copy)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// A mongo-style filter: top-level equality constraints, numeric `toa`-style
/// bounds, and an absent-or-false check, all ANDed together. Deliberately not
/// a full query language — the stack only ever needs these shapes.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub eq: Vec<(String, Value)>,
    pub lt: Vec<(String, i64)>,
    pub lte: Vec<(String, i64)>,
    pub absent_or_false: Vec<String>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.eq.push((field.into(), value.into()));
        self
    }

    pub fn lt(mut self, field: impl Into<String>, value: i64) -> Self {
        self.lt.push((field.into(), value));
        self
    }

    pub fn lte(mut self, field: impl Into<String>, value: i64) -> Self {
        self.lte.push((field.into(), value));
        self
    }

    pub fn absent_or_false(mut self, field: impl Into<String>) -> Self {
        self.absent_or_false.push(field.into());
        self
    }
}

fn is_safe_identifier(field: &str) -> bool {
    !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Thin, typed surface over a single Postgres-backed document collection.
/// Collections are created lazily: there is no fixed migration set, since
/// collection names are caller-supplied.
pub struct Store {
    pool: PgPool,
    collection: String,
}

impl Clone for Store {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            collection: self.collection.clone(),
        }
    }
}

impl Store {
    pub fn new(pool: PgPool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    fn quoted(&self) -> String {
        format!("\"{}\"", self.collection.replace('"', "\"\""))
    }

    #[instrument(skip(self))]
    pub async fn ensure_table(&self) -> CoreResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (id BYTEA PRIMARY KEY, doc JSONB NOT NULL)",
            self.quoted()
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    fn normalize_for_storage(mut doc: Value) -> (DocId, Value) {
        let id = match doc.as_object_mut() {
            Some(obj) => {
                let supplied = obj
                    .remove("id")
                    .or_else(|| obj.remove("_id"))
                    .and_then(|v| v.as_str().map(|s| s.to_string()));
                obj.remove("_id");
                supplied
                    .and_then(|s| DocId::from_hex(&s).ok())
                    .unwrap_or_else(DocId::new)
            }
            None => DocId::new(),
        };
        (id, doc)
    }

    fn normalize_for_read(id: &DocId, mut doc: Value) -> Value {
        if let Some(obj) = doc.as_object_mut() {
            obj.remove("_id");
            obj.insert("id".to_string(), Value::String(id.to_hex()));
        }
        doc
    }

    #[instrument(skip(self, doc))]
    pub async fn insert(&self, doc: Value) -> CoreResult<DocId> {
        let (id, body) = Self::normalize_for_storage(doc);
        let sql = format!("INSERT INTO {} (id, doc) VALUES ($1, $2)", self.quoted());
        sqlx::query(&sql)
            .bind(id.as_bytes().to_vec())
            .bind(&body)
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    /// Insert with a predetermined id (used by the revision stack's insert
    /// action, where the master id was generated at push time).
    #[instrument(skip(self, doc))]
    pub async fn insert_with_id(&self, id: &DocId, doc: Value) -> CoreResult<DocId> {
        let (_, body) = Self::normalize_for_storage(doc);
        let sql = format!("INSERT INTO {} (id, doc) VALUES ($1, $2)", self.quoted());
        sqlx::query(&sql)
            .bind(id.as_bytes().to_vec())
            .bind(&body)
            .execute(&self.pool)
            .await?;
        Ok(*id)
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &DocId) -> CoreResult<Option<Value>> {
        let sql = format!("SELECT doc FROM {} WHERE id = $1", self.quoted());
        let row = sqlx::query(&sql)
            .bind(id.as_bytes().to_vec())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| {
            let doc: Value = r.get("doc");
            Self::normalize_for_read(id, doc)
        }))
    }

    #[instrument(skip(self, filter))]
    pub async fn find(
        &self,
        filter: &Filter,
        orderby: Option<&str>,
        direction: SortDirection,
        page: u32,
        limit: u32,
    ) -> CoreResult<Vec<Value>> {
        let mut sql = format!("SELECT id, doc FROM {} WHERE 1 = 1", self.quoted());
        let mut binds: Vec<String> = Vec::new();

        for (field, value) in &filter.eq {
            if !is_safe_identifier(field) {
                continue;
            }
            binds.push(value_as_text(value));
            sql.push_str(&format!(" AND doc->>'{}' = ${}", field, binds.len()));
        }
        for field in &filter.absent_or_false {
            if !is_safe_identifier(field) {
                continue;
            }
            sql.push_str(&format!(
                " AND (doc->'{0}' IS NULL OR doc->>'{0}' = 'false')",
                field
            ));
        }

        let mut query = sqlx::query(&sql);
        for b in &binds {
            query = query.bind(b);
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut docs: Vec<(DocId, Value)> = rows
            .into_iter()
            .map(|r| {
                let id_bytes: Vec<u8> = r.get("id");
                let id = DocId::from_bytes(&id_bytes).unwrap_or_default();
                let doc: Value = r.get("doc");
                (id, Self::normalize_for_read(&id, doc))
            })
            .collect();

        docs.retain(|(_, doc)| {
            filter.lt.iter().all(|(field, bound)| {
                doc.get(field)
                    .and_then(Value::as_i64)
                    .map_or(true, |v| v < *bound)
            }) && filter.lte.iter().all(|(field, bound)| {
                doc.get(field)
                    .and_then(Value::as_i64)
                    .map_or(true, |v| v <= *bound)
            })
        });

        if let Some(field) = orderby {
            let field = field.to_string();
            docs.sort_by(|(id_a, a), (id_b, b)| {
                let av = a.get(&field).and_then(Value::as_i64).unwrap_or(0);
                let bv = b.get(&field).and_then(Value::as_i64).unwrap_or(0);
                let ord = av.cmp(&bv).then_with(|| id_a.cmp(id_b));
                match direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            });
        }

        let start = (page as usize) * (limit.max(1) as usize);
        if start >= docs.len() {
            return Ok(Vec::new());
        }
        let end = if limit == 0 {
            docs.len()
        } else {
            (start + limit as usize).min(docs.len())
        };
        Ok(docs[start..end].iter().map(|(_, d)| d.clone()).collect())
    }

    #[instrument(skip(self, doc))]
    pub async fn update(&self, id: &DocId, doc: Value, upsert: bool) -> CoreResult<UpdateOutcome> {
        let (_, body) = Self::normalize_for_storage(doc);
        if upsert {
            let sql = format!(
                "INSERT INTO {} (id, doc) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc",
                self.quoted()
            );
            let result = sqlx::query(&sql)
                .bind(id.as_bytes().to_vec())
                .bind(&body)
                .execute(&self.pool)
                .await?;
            Ok(UpdateOutcome {
                matched: result.rows_affected(),
                modified: result.rows_affected(),
                upserted: true,
            })
        } else {
            let sql = format!("UPDATE {} SET doc = $2 WHERE id = $1", self.quoted());
            let result = sqlx::query(&sql)
                .bind(id.as_bytes().to_vec())
                .bind(&body)
                .execute(&self.pool)
                .await?;
            let n = result.rows_affected();
            Ok(UpdateOutcome {
                matched: n,
                modified: n,
                upserted: false,
            })
        }
    }

    /// Apply `attrs` as a `$set`, one `jsonb_set` per dotted path, atomically.
    #[instrument(skip(self, attrs))]
    pub async fn patch(&self, id: &DocId, attrs: &Map<String, Value>) -> CoreResult<UpdateOutcome> {
        let mut attrs = attrs.clone();
        attrs.remove("id");
        attrs.remove("_id");
        if attrs.is_empty() {
            return Ok(UpdateOutcome::default());
        }

        let mut expr = "doc".to_string();
        for i in 0..attrs.len() {
            let path_idx = 2 + i * 2;
            let value_idx = path_idx + 1;
            expr = format!("jsonb_set({}, ${}, ${}, true)", expr, path_idx, value_idx);
        }
        let sql = format!("UPDATE {} SET doc = {} WHERE id = $1", self.quoted(), expr);

        let mut query = sqlx::query(&sql).bind(id.as_bytes().to_vec());
        for (path, value) in &attrs {
            let segments: Vec<String> = path.split('.').map(str::to_string).collect();
            query = query.bind(segments).bind(value.clone());
        }
        let result = query.execute(&self.pool).await?;
        let n = result.rows_affected();
        Ok(UpdateOutcome {
            matched: n,
            modified: n,
            upserted: false,
        })
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &DocId) -> CoreResult<DeleteOutcome> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.quoted());
        let result = sqlx::query(&sql)
            .bind(id.as_bytes().to_vec())
            .execute(&self.pool)
            .await?;
        Ok(DeleteOutcome {
            n: result.rows_affected(),
        })
    }

    /// Multi-document `$set`, used by the publisher's claim step.
    #[instrument(skip(self, attrs))]
    pub async fn bulk_set(
        &self,
        ids: &[DocId],
        attrs: &Map<String, Value>,
    ) -> CoreResult<UpdateOutcome> {
        if ids.is_empty() || attrs.is_empty() {
            return Ok(UpdateOutcome::default());
        }

        let mut expr = "doc".to_string();
        for i in 0..attrs.len() {
            let path_idx = 2 + i * 2;
            let value_idx = path_idx + 1;
            expr = format!("jsonb_set({}, ${}, ${}, true)", expr, path_idx, value_idx);
        }
        let sql = format!(
            "UPDATE {} SET doc = {} WHERE id = ANY($1)",
            self.quoted(),
            expr
        );

        let id_bytes: Vec<Vec<u8>> = ids.iter().map(|id| id.as_bytes().to_vec()).collect();
        let mut query = sqlx::query(&sql).bind(id_bytes);
        for (path, value) in attrs {
            let segments: Vec<String> = path.split('.').map(str::to_string).collect();
            query = query.bind(segments).bind(value.clone());
        }
        let result = query.execute(&self.pool).await?;
        Ok(UpdateOutcome {
            matched: result.rows_affected(),
            modified: result.rows_affected(),
            upserted: false,
        })
    }
}
