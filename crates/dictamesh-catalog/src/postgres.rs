//! Postgres-backed [`CatalogRepository`], using sqlx's runtime query API
//! (`query`/`query_as` with `.bind()`) rather than the `query!`/`query_as!`
//! macros: those require either a live database or a checked-in offline
//! query cache at build time, and this workspace carries neither.

use async_trait::async_trait;
use chrono::Utc;
use dictamesh_types::catalog_row::{AuthKind, DiscoveryHint, DiscoveryMethod, GovernanceFlags, QualityMetrics};
use dictamesh_types::id::IdGenerator;
use dictamesh_types::{
    changed_fields, AttributeMap, CatalogRow, Compatibility, Entity, EntityId, EntityLifecycle, EntityMetadata,
    Relationship, Schema, SchemaFormat,
};
use sqlx::types::Json;
use sqlx::PgPool;
use sqlx::Row;

use crate::error::CatalogError;
use crate::lineage::LineageEdge;
use crate::outbox;
use crate::repository::{CatalogRepository, GetOptions};
use crate::search::{SearchQuery, SearchResults};

#[derive(sqlx::FromRow)]
struct EntityRecord {
    row_id: String,
    entity_id: String,
    entity_type: String,
    domain: String,
    source_system: String,
    source_entity_id: String,
    discovery: Json<DiscoveryHint>,
    quality: Json<QualityMetrics>,
    governance: Json<GovernanceFlags>,
    attributes: Json<AttributeMap>,
    metadata: Json<EntityMetadata>,
    schema_version: i32,
    lifecycle: String,
}

fn parse_lifecycle(raw: &str) -> Result<EntityLifecycle, CatalogError> {
    match raw {
        "discovered" => Ok(EntityLifecycle::Discovered),
        "registered" => Ok(EntityLifecycle::Registered),
        "active" => Ok(EntityLifecycle::Active),
        "deprecated" => Ok(EntityLifecycle::Deprecated),
        "deleted" => Ok(EntityLifecycle::Deleted),
        other => Err(CatalogError::Outbox(format!("unrecognized lifecycle {other:?}"))),
    }
}

fn lifecycle_wire(lifecycle: EntityLifecycle) -> &'static str {
    match lifecycle {
        EntityLifecycle::Discovered => "discovered",
        EntityLifecycle::Registered => "registered",
        EntityLifecycle::Active => "active",
        EntityLifecycle::Deprecated => "deprecated",
        EntityLifecycle::Deleted => "deleted",
    }
}

impl EntityRecord {
    fn into_entity(self) -> Result<Entity, CatalogError> {
        Ok(Entity {
            id: EntityId::parse(self.entity_id).map_err(|e| CatalogError::Outbox(e.to_string()))?,
            entity_type: self.entity_type,
            domain: self.domain,
            attributes: self.attributes.0,
            relationships: Vec::new(),
            metadata: self.metadata.0,
            schema_version: self.schema_version as u32,
            lifecycle: parse_lifecycle(&self.lifecycle)?,
        })
    }

}

fn default_discovery() -> DiscoveryHint {
    DiscoveryHint {
        endpoint_template: String::new(),
        method: DiscoveryMethod::Get,
        auth_kind: AuthKind::None,
    }
}

/// Postgres-backed metadata catalog. Event emission happens inside the same
/// transaction as the row mutation via [`outbox::enqueue`]; a separate
/// [`crate::outbox::OutboxDispatcher`] publishes them out-of-band.
pub struct PostgresCatalog {
    pool: PgPool,
    id_gen: IdGenerator,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool, shard: u16) -> Self {
        Self { pool, id_gen: IdGenerator::new(shard) }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CatalogRepository for PostgresCatalog {
    async fn create(&self, entity: &Entity) -> Result<CatalogRow, CatalogError> {
        if !entity.has_consistent_id() {
            return Err(CatalogError::Outbox(format!(
                "entity id {} does not match declared type {}",
                entity.id, entity.entity_type
            )));
        }

        let mut tx = self.pool.begin().await?;
        let row_id = self.id_gen.next();
        let governance = GovernanceFlags {
            contains_pii: entity.metadata.contains_pii,
            classification: Default::default(),
            retention_days: None,
        };

        let existing = sqlx::query(
            "select 1 as hit from dictamesh_entity_catalog where source_system = $1 and source_entity_id = $2",
        )
        .bind(&entity.metadata.source_system)
        .bind(&entity.metadata.source_id)
        .fetch_optional(&mut *tx)
        .await?;
        if existing.is_some() {
            return Err(CatalogError::AlreadyExists(
                entity.metadata.source_system.clone(),
                entity.metadata.source_id.clone(),
            ));
        }

        sqlx::query(
            "insert into dictamesh_entity_catalog \
             (row_id, entity_id, entity_type, domain, source_system, source_entity_id, \
              discovery, quality, governance, contains_pii, attributes, metadata, schema_version, \
              lifecycle, created_at, updated_at, last_seen_at) \
             values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,now(),now(),now())",
        )
        .bind(row_id.to_string())
        .bind(entity.id.as_str())
        .bind(&entity.entity_type)
        .bind(&entity.domain)
        .bind(&entity.metadata.source_system)
        .bind(&entity.metadata.source_id)
        .bind(Json(default_discovery()))
        .bind(Json(QualityMetrics::default()))
        .bind(Json(governance.clone()))
        .bind(governance.contains_pii)
        .bind(Json(entity.attributes.clone()))
        .bind(Json(entity.metadata.clone()))
        .bind(entity.schema_version as i32)
        .bind(lifecycle_wire(entity.lifecycle))
        .execute(&mut *tx)
        .await?;

        let event = dictamesh_types::EventBuilder::new(entity.metadata.source_system.clone())
            .entity(entity.id.clone())
            .payload(serde_json::json!({ "entity_type": entity.entity_type, "entity": entity }))
            .build(dictamesh_types::EventType::EntityCreated, uuid::Uuid::new_v4(), Utc::now())
            .map_err(|e| CatalogError::Outbox(e.to_string()))?;
        outbox::enqueue(&mut tx, &self.id_gen, &event).await?;

        tx.commit().await?;

        Ok(CatalogRow {
            row_id,
            entity_id: entity.id.clone(),
            entity_type: entity.entity_type.clone(),
            domain: entity.domain.clone(),
            source_system: entity.metadata.source_system.clone(),
            source_entity_id: entity.metadata.source_id.clone(),
            discovery: default_discovery(),
            quality: QualityMetrics::default(),
            governance,
            schema_version: entity.schema_version,
            lifecycle: entity.lifecycle,
            last_seen_at: Utc::now(),
        })
    }

    async fn get(&self, id: &EntityId, _opts: GetOptions) -> Result<Entity, CatalogError> {
        let record: Option<EntityRecord> = sqlx::query_as(
            "select row_id, entity_id, entity_type, domain, source_system, source_entity_id, \
                    discovery, quality, governance, attributes, metadata, schema_version, lifecycle \
             from dictamesh_entity_catalog where entity_id = $1 and lifecycle != 'deleted'",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match record {
            Some(record) => record.into_entity(),
            None => Err(CatalogError::NotFound(id.to_string())),
        }
    }

    async fn update(&self, entity: &Entity) -> Result<Option<(Entity, Vec<String>)>, CatalogError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<EntityRecord> = sqlx::query_as(
            "select row_id, entity_id, entity_type, domain, source_system, source_entity_id, \
                    discovery, quality, governance, attributes, metadata, schema_version, lifecycle \
             from dictamesh_entity_catalog where entity_id = $1 for update",
        )
        .bind(entity.id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(existing) = existing else {
            return Err(CatalogError::NotFound(entity.id.to_string()));
        };
        let before_attrs = existing.attributes.0.clone();
        let diff = changed_fields(&before_attrs, &entity.attributes);
        if diff.is_empty() {
            return Ok(None);
        }

        sqlx::query(
            "update dictamesh_entity_catalog set attributes = $1, metadata = $2, schema_version = $3, \
             lifecycle = $4, updated_at = now(), last_seen_at = now() where entity_id = $5",
        )
        .bind(Json(entity.attributes.clone()))
        .bind(Json(entity.metadata.clone()))
        .bind(entity.schema_version as i32)
        .bind(lifecycle_wire(entity.lifecycle))
        .bind(entity.id.as_str())
        .execute(&mut *tx)
        .await?;

        let event = dictamesh_types::EventBuilder::new(entity.metadata.source_system.clone())
            .entity(entity.id.clone())
            .payload(serde_json::json!({ "entity_type": entity.entity_type, "changed_fields": diff }))
            .build(dictamesh_types::EventType::EntityUpdated, uuid::Uuid::new_v4(), Utc::now())
            .map_err(|e| CatalogError::Outbox(e.to_string()))?;
        outbox::enqueue(&mut tx, &self.id_gen, &event).await?;

        tx.commit().await?;
        Ok(Some((entity.clone(), diff)))
    }

    async fn delete(&self, id: &EntityId) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await?;
        let source: Option<(String,)> = sqlx::query_as(
            "select source_system from dictamesh_entity_catalog where entity_id = $1 for update",
        )
        .bind(id.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        let Some((source_adapter,)) = source else {
            return Err(CatalogError::NotFound(id.to_string()));
        };

        sqlx::query("update dictamesh_entity_catalog set lifecycle = 'deleted', updated_at = now() where entity_id = $1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;

        let event = dictamesh_types::EventBuilder::new(source_adapter)
            .entity(id.clone())
            .payload(serde_json::json!({}))
            .build(dictamesh_types::EventType::EntityDeleted, uuid::Uuid::new_v4(), Utc::now())
            .map_err(|e| CatalogError::Outbox(e.to_string()))?;
        outbox::enqueue(&mut tx, &self.id_gen, &event).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn create_relationship(&self, rel: &Relationship) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await?;

        let subject_exists: bool =
            sqlx::query("select 1 from dictamesh_entity_catalog where entity_id = $1 and lifecycle != 'deleted'")
                .bind(rel.subject_id.as_str())
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
        let object_exists: bool =
            sqlx::query("select 1 from dictamesh_entity_catalog where entity_id = $1 and lifecycle != 'deleted'")
                .bind(rel.object_id.as_str())
                .fetch_optional(&mut *tx)
                .await?
                .is_some();

        if (!subject_exists || !object_exists) && !rel.dangling {
            let missing = if !subject_exists { &rel.subject_id } else { &rel.object_id };
            return Err(CatalogError::DanglingEndpoint(missing.to_string()));
        }

        let row_id = self.id_gen.next();
        sqlx::query(
            "insert into dictamesh_entity_relationships \
             (id, subject_id, subject_type, relationship_type, object_id, object_type, \
              cardinality, valid_from, valid_to, attributes, dangling, created_at) \
             values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,now())",
        )
        .bind(row_id.to_string())
        .bind(rel.subject_id.as_str())
        .bind(&rel.subject_type)
        .bind(&rel.relationship_type)
        .bind(rel.object_id.as_str())
        .bind(&rel.object_type)
        .bind(match rel.cardinality {
            dictamesh_types::Cardinality::One => "one",
            dictamesh_types::Cardinality::Many => "many",
        })
        .bind(rel.valid_from)
        .bind(rel.valid_to)
        .bind(Json(rel.attributes.clone()))
        .bind(!subject_exists || !object_exists)
        .execute(&mut *tx)
        .await?;

        let event = dictamesh_types::EventBuilder::new("catalog")
            .entity(rel.subject_id.clone())
            .payload(serde_json::json!({
                "subject_id": rel.subject_id,
                "object_id": rel.object_id,
                "relationship_type": rel.relationship_type,
            }))
            .build(dictamesh_types::EventType::RelationshipCreated, uuid::Uuid::new_v4(), Utc::now())
            .map_err(|e| CatalogError::Outbox(e.to_string()))?;
        outbox::enqueue(&mut tx, &self.id_gen, &event).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_relationships(
        &self,
        id: &EntityId,
        relationship_type: Option<&str>,
    ) -> Result<Vec<Relationship>, CatalogError> {
        let rows = match relationship_type {
            Some(rt) => {
                sqlx::query(
                    "select subject_id, subject_type, relationship_type, object_id, object_type, \
                            cardinality, valid_from, valid_to, attributes, dangling \
                     from dictamesh_entity_relationships where (subject_id = $1 or object_id = $1) and relationship_type = $2",
                )
                .bind(id.as_str())
                .bind(rt)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "select subject_id, subject_type, relationship_type, object_id, object_type, \
                            cardinality, valid_from, valid_to, attributes, dangling \
                     from dictamesh_entity_relationships where subject_id = $1 or object_id = $1",
                )
                .bind(id.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter()
            .map(|row| {
                let cardinality: String = row.try_get("cardinality")?;
                let attributes: Json<AttributeMap> = row.try_get("attributes")?;
                Ok(Relationship {
                    subject_id: EntityId::parse(row.try_get::<String, _>("subject_id")?)
                        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
                    subject_type: row.try_get("subject_type")?,
                    relationship_type: row.try_get("relationship_type")?,
                    object_id: EntityId::parse(row.try_get::<String, _>("object_id")?)
                        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
                    object_type: row.try_get("object_type")?,
                    cardinality: if cardinality == "one" {
                        dictamesh_types::Cardinality::One
                    } else {
                        dictamesh_types::Cardinality::Many
                    },
                    valid_from: row.try_get("valid_from")?,
                    valid_to: row.try_get("valid_to")?,
                    attributes: attributes.0,
                    dangling: row.try_get("dangling")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(CatalogError::from)
    }

    async fn track_lineage(&self, edge: &LineageEdge) -> Result<(), CatalogError> {
        let row_id = self.id_gen.next();
        sqlx::query(
            "insert into dictamesh_data_lineage (id, upstream_id, downstream_id, operation, recorded_at) \
             values ($1,$2,$3,$4,$5)",
        )
        .bind(row_id.to_string())
        .bind(edge.upstream_id.as_str())
        .bind(edge.downstream_id.as_str())
        .bind(&edge.operation)
        .bind(edge.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn register_schema(&self, schema: &Schema) -> Result<(), CatalogError> {
        if let Some(latest) = self.latest_schema(&schema.entity_type).await? {
            dictamesh_types::schema::check_compatible(&latest, schema, schema.compatibility).map_err(|_| {
                CatalogError::IncompatibleSchema {
                    entity_type: schema.entity_type.clone(),
                    version: schema.version,
                }
            })?;
        }

        sqlx::query(
            "insert into dictamesh_schemas (entity_type, version, format, definition, compatibility, registered_at) \
             values ($1,$2,$3,$4,$5,$6)",
        )
        .bind(&schema.entity_type)
        .bind(schema.version as i32)
        .bind(match schema.format {
            SchemaFormat::Avro => "avro",
            SchemaFormat::JsonSchema => "json_schema",
        })
        .bind(&schema.definition)
        .bind(match schema.compatibility {
            Compatibility::Backward => "backward",
            Compatibility::Forward => "forward",
            Compatibility::Full => "full",
            Compatibility::None => "none",
        })
        .bind(schema.registered_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_schema(&self, entity_type: &str) -> Result<Option<Schema>, CatalogError> {
        let row = sqlx::query(
            "select entity_type, version, format, definition, compatibility, registered_at \
             from dictamesh_schemas where entity_type = $1 order by version desc limit 1",
        )
        .bind(entity_type)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let format: String = row.try_get("format")?;
        let compatibility: String = row.try_get("compatibility")?;
        Ok(Some(Schema {
            entity_type: row.try_get("entity_type")?,
            version: row.try_get::<i32, _>("version")? as u32,
            format: if format == "avro" { SchemaFormat::Avro } else { SchemaFormat::JsonSchema },
            definition: row.try_get("definition")?,
            registered_at: row.try_get("registered_at")?,
            compatibility: match compatibility.as_str() {
                "backward" => Compatibility::Backward,
                "forward" => Compatibility::Forward,
                "full" => Compatibility::Full,
                _ => Compatibility::None,
            },
        }))
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResults<Entity>, CatalogError> {
        let mut sql = String::from(
            "select row_id, entity_id, entity_type, domain, source_system, source_entity_id, \
                    discovery, quality, governance, attributes, metadata, schema_version, lifecycle \
             from dictamesh_entity_catalog where lifecycle != 'deleted'",
        );
        let mut count_sql = String::from("select count(*) as total from dictamesh_entity_catalog where lifecycle != 'deleted'");
        let mut clauses = Vec::new();
        let mut idx = 1;
        if query.entity_type.is_some() {
            clauses.push(format!("entity_type = ${idx}"));
            idx += 1;
        }
        if query.domain.is_some() {
            clauses.push(format!("domain = ${idx}"));
            idx += 1;
        }
        if query.contains_pii.is_some() {
            clauses.push(format!("contains_pii = ${idx}"));
            idx += 1;
        }
        if query.text.is_some() {
            clauses.push(format!(
                "to_tsvector('simple', entity_id || ' ' || source_entity_id) @@ plainto_tsquery('simple', ${idx})"
            ));
            idx += 1;
        }
        for clause in &clauses {
            sql.push_str(" and ");
            sql.push_str(clause);
            count_sql.push_str(" and ");
            count_sql.push_str(clause);
        }
        sql.push_str(&format!(" order by last_seen_at desc limit ${idx} offset ${}", idx + 1));

        let mut list_query = sqlx::query_as::<_, EntityRecord>(&sql);
        let mut count_query = sqlx::query(&count_sql);
        if let Some(et) = &query.entity_type {
            list_query = list_query.bind(et);
            count_query = count_query.bind(et);
        }
        if let Some(domain) = &query.domain {
            list_query = list_query.bind(domain);
            count_query = count_query.bind(domain);
        }
        if let Some(pii) = query.contains_pii {
            list_query = list_query.bind(pii);
            count_query = count_query.bind(pii);
        }
        if let Some(text) = &query.text {
            list_query = list_query.bind(text);
            count_query = count_query.bind(text);
        }
        list_query = list_query.bind(query.limit()).bind(query.offset());

        let records = list_query.fetch_all(&self.pool).await?;
        let total: i64 = count_query.fetch_one(&self.pool).await?.try_get("total")?;

        let items = records.into_iter().map(EntityRecord::into_entity).collect::<Result<Vec<_>, _>>()?;
        Ok(SearchResults { items, total, page: query.page, page_size: query.page_size })
    }
}
