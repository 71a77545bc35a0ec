//! Shared fixtures: a one-dimensional toy world and fake geoprocesses
//!
//! Geometry is reduced to positions on a line. Zones, RSUs and blocks are
//! intervals `[x_min, x_max]`; roads, rail, vegetation, water and buildings
//! are points. The fakes keep the contract of the real processes: prefixed
//! output tables, one new id column per relation table.
//!
//! Seeded layout of zone Z1 = [0, 100]:
//! - RSU cuts: 10 (large vegetation), 30 and 60 (roads), 45 (large water), 80 (rail)
//! - RSUs: [0,10] [10,30] [30,45] [45,60] [60,80] [80,100], ids 1..=6
//! - buildings at 5.0, 5.005, 12.0, 29.995, 30.004, 50.0, 90.0
//! - blocks (distance 0.01): [5.0,5.005] [12,12] [29.995,30.004] [50,50] [90,90]

#![allow(dead_code)]

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use geounits_orchestration::specs::{self, params};
use geounits_orchestration::{
    BoundArguments, OrchestratorSettings, ParamValue, PipelineOrchestrator, Process,
    ProcessContext, ProcessOutcome, ProcessOutputs, ProcessRegistry, ProcessSpec, StepId,
    UnitsInput,
};
use geounits_storage::{Datastore, FieldValue, InMemoryDatastore, Row, TableNamer};
use parking_lot::Mutex;
use std::sync::Arc;

pub const BUILDING_XS: [f64; 7] = [5.0, 5.005, 12.0, 29.995, 30.004, 50.0, 90.0];

/// How a step is made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// `ProcessOutcome::Failed`
    Report,
    /// `Err(anyhow::Error)`
    Error,
    /// Success without the declared outputs
    MissingOutput,
    Panic,
}

/// Invocation log and failure switch shared by all fakes of a world
#[derive(Default)]
pub struct Probe {
    invocations: Mutex<Vec<StepId>>,
    fail_at: Mutex<Option<(StepId, FailureMode)>>,
}

impl Probe {
    pub fn fail_at(&self, step: StepId, mode: FailureMode) {
        *self.fail_at.lock() = Some((step, mode));
    }

    pub fn invocations(&self) -> Vec<StepId> {
        self.invocations.lock().clone()
    }

    pub fn count(&self, step: StepId) -> usize {
        self.invocations.lock().iter().filter(|s| **s == step).count()
    }
}

pub fn row<const N: usize>(pairs: [(&str, FieldValue); N]) -> Row {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Datastore seeded with the toy input layers, plus the fakes operating on it
pub struct World {
    pub store: InMemoryDatastore,
    pub probe: Arc<Probe>,
}

impl World {
    pub fn new() -> Self {
        let world = Self::empty();
        world.seed().expect("seeding the toy world");
        world
    }

    /// No input tables at all
    pub fn empty() -> Self {
        Self {
            store: InMemoryDatastore::new(),
            probe: Arc::new(Probe::default()),
        }
    }

    fn seed(&self) -> geounits_storage::Result<()> {
        let store = &self.store;

        store.create_table("Z1", &["id_zone", "x_min", "x_max"])?;
        store.insert_rows(
            "Z1",
            [row([
                ("id_zone", FieldValue::Int(1)),
                ("x_min", FieldValue::Float(0.0)),
                ("x_max", FieldValue::Float(100.0)),
            ])],
        )?;

        store.create_table("BU", &["id_build", "x"])?;
        store.insert_rows(
            "BU",
            BUILDING_XS.iter().enumerate().map(|(i, x)| {
                row([
                    ("id_build", FieldValue::Int(i as i64 + 1)),
                    ("x", FieldValue::Float(*x)),
                ])
            }),
        )?;

        for (table, xs) in [("RD", &[30.0, 60.0][..]), ("RL", &[80.0][..])] {
            store.create_table(table, &["x"])?;
            store.insert_rows(table, xs.iter().map(|x| row([("x", FieldValue::Float(*x))])))?;
        }

        // One patch above and one below each default area threshold
        for (table, patches) in [
            ("VG", [(10.0, 200_000.0), (20.0, 50.0)]),
            ("HY", [(45.0, 3_000.0), (50.0, 100.0)]),
        ] {
            store.create_table(table, &["x", "area"])?;
            store.insert_rows(
                table,
                patches.iter().map(|(x, area)| {
                    row([("x", FieldValue::Float(*x)), ("area", FieldValue::Float(*area))])
                }),
            )?;
        }

        Ok(())
    }

    pub fn datastore(&self) -> Arc<dyn Datastore> {
        Arc::new(self.store.clone())
    }

    pub fn registry(&self) -> ProcessRegistry {
        [
            (specs::prepare_rsu_data(), Kind::PrepareRsuData),
            (specs::create_rsu(), Kind::CreateRsu),
            (specs::create_blocks(), Kind::CreateBlocks),
            (specs::create_scales_relations(), Kind::ScalesRelations),
        ]
        .into_iter()
        .fold(ProcessRegistry::new(), |registry, (spec, kind)| {
            registry.with(Arc::new(FakeProcess {
                spec,
                kind,
                store: self.store.clone(),
                probe: self.probe.clone(),
            }))
        })
    }

    pub fn orchestrator(&self, settings: OrchestratorSettings) -> PipelineOrchestrator {
        PipelineOrchestrator::new(self.registry(), self.datastore())
            .expect("default plan with fake processes")
            .with_settings(settings)
    }

    /// Sorted table names with their columns
    pub async fn schema(&self) -> Vec<(String, Vec<String>)> {
        let mut schema = Vec::new();
        for table in self.store.table_names() {
            let columns = self.store.table_columns(&table).await.unwrap();
            schema.push((table, columns));
        }
        schema
    }

    /// `(key column value, value column value)` pairs of a table
    pub fn pairs(&self, table: &str, key: &str, value: &str) -> Vec<(i64, Option<i64>)> {
        self.store
            .rows(table)
            .unwrap()
            .iter()
            .map(|r| {
                (
                    r[key].as_int().unwrap(),
                    r.get(value).and_then(FieldValue::as_int),
                )
            })
            .collect()
    }
}

pub fn init_tracing() {
    geounits_orchestration::telemetry::init_test_tracing();
}

/// Inputs of the reference scenario
pub fn scenario_input() -> UnitsInput {
    UnitsInput::new("Z1", "BU", "RD", "RL", "VG", "HY", "p1")
        .surface_vegetation(100_000.0)
        .surface_hydro(2_500.0)
        .distance(0.01)
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    PrepareRsuData,
    CreateRsu,
    CreateBlocks,
    ScalesRelations,
}

struct FakeProcess {
    spec: ProcessSpec,
    kind: Kind,
    store: InMemoryDatastore,
    probe: Arc<Probe>,
}

fn float(row: &Row, column: &str) -> anyhow::Result<f64> {
    row.get(column)
        .and_then(FieldValue::as_float)
        .ok_or_else(|| anyhow!("row has no numeric '{}'", column))
}

fn outputs<const N: usize>(pairs: [(&str, ParamValue); N]) -> ProcessOutputs {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[async_trait]
impl Process for FakeProcess {
    fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    async fn execute(
        &self,
        args: BoundArguments,
        ctx: &ProcessContext,
    ) -> anyhow::Result<ProcessOutcome> {
        self.probe.invocations.lock().push(ctx.step);

        let failure = *self.probe.fail_at.lock();
        if let Some((step, mode)) = failure {
            if step == ctx.step {
                match mode {
                    FailureMode::Report => {
                        return Ok(ProcessOutcome::failed(format!(
                            "{} rejected its input",
                            self.spec.name
                        )))
                    }
                    FailureMode::Error => return Err(anyhow!("{} lost its input", self.spec.name)),
                    FailureMode::MissingOutput => {
                        return Ok(ProcessOutcome::Succeeded(ProcessOutputs::new()))
                    }
                    FailureMode::Panic => panic!("{} crashed", self.spec.name),
                }
            }
        }

        let namer = TableNamer::new(args.text(params::PREFIX)?);
        match self.kind {
            Kind::PrepareRsuData => self.prepare_rsu_data(&args, &namer),
            Kind::CreateRsu => self.create_rsu(&args, &namer),
            Kind::CreateBlocks => self.create_blocks(&args, &namer),
            Kind::ScalesRelations => self.relate(&args, &namer).await,
        }
    }
}

impl FakeProcess {
    /// Cut positions: zone bounds, roads, rail, large vegetation and water
    fn prepare_rsu_data(
        &self,
        args: &BoundArguments,
        namer: &TableNamer,
    ) -> anyhow::Result<ProcessOutcome> {
        let mut cuts = Vec::new();

        for zone in self.store.rows(args.table(params::ZONE_TABLE)?)? {
            cuts.push(float(&zone, "x_min")?);
            cuts.push(float(&zone, "x_max")?);
        }
        for key in [params::ROAD_TABLE, params::RAIL_TABLE] {
            for r in self.store.rows(args.table(key)?)? {
                cuts.push(float(&r, "x")?);
            }
        }
        for (key, threshold) in [
            (params::VEGETATION_TABLE, args.float(params::SURFACE_VEGETATION)?),
            (params::HYDROGRAPHIC_TABLE, args.float(params::SURFACE_HYDRO)?),
        ] {
            for r in self.store.rows(args.table(key)?)? {
                if float(&r, "area")? >= threshold {
                    cuts.push(float(&r, "x")?);
                }
            }
        }

        cuts.sort_by(|a, b| a.total_cmp(b));
        cuts.dedup();

        let table = namer.prefixed("rsu_barriers");
        self.store.create_table(&table, &["x"])?;
        self.store
            .insert_rows(&table, cuts.into_iter().map(|x| row([("x", FieldValue::Float(x))])))?;

        Ok(ProcessOutcome::Succeeded(outputs([(
            params::OUTPUT_TABLE,
            ParamValue::table(table),
        )])))
    }

    /// Intervals between consecutive cuts
    fn create_rsu(&self, args: &BoundArguments, namer: &TableNamer) -> anyhow::Result<ProcessOutcome> {
        let mut cuts = self
            .store
            .rows(args.table(params::INPUT_TABLE)?)?
            .iter()
            .map(|r| float(r, "x"))
            .collect::<anyhow::Result<Vec<_>>>()?;
        cuts.sort_by(|a, b| a.total_cmp(b));

        if cuts.len() < 2 {
            return Ok(ProcessOutcome::failed("not enough barriers to form an RSU"));
        }

        let table = namer.prefixed("rsu");
        self.store.create_table(&table, &["id_rsu", "x_min", "x_max"])?;
        self.store.insert_rows(
            &table,
            cuts.windows(2).enumerate().map(|(i, w)| {
                row([
                    ("id_rsu", FieldValue::Int(i as i64 + 1)),
                    ("x_min", FieldValue::Float(w[0])),
                    ("x_max", FieldValue::Float(w[1])),
                ])
            }),
        )?;

        Ok(ProcessOutcome::Succeeded(outputs([
            (params::OUTPUT_TABLE, ParamValue::table(table)),
            (params::OUTPUT_ID_RSU, ParamValue::column("id_rsu")),
        ])))
    }

    /// Consecutive buildings closer than `distance` share a block
    fn create_blocks(
        &self,
        args: &BoundArguments,
        namer: &TableNamer,
    ) -> anyhow::Result<ProcessOutcome> {
        let distance = args.float(params::DISTANCE)?;
        let mut xs = self
            .store
            .rows(args.table(params::INPUT_TABLE)?)?
            .iter()
            .map(|r| float(r, "x"))
            .collect::<anyhow::Result<Vec<_>>>()?;
        xs.sort_by(|a, b| a.total_cmp(b));

        let mut blocks: Vec<(f64, f64)> = Vec::new();
        for x in xs {
            match blocks.last_mut() {
                Some(last) if x - last.1 <= distance => last.1 = x,
                _ => blocks.push((x, x)),
            }
        }

        if blocks.is_empty() {
            return Ok(ProcessOutcome::failed("no buildings to group into blocks"));
        }

        let table = namer.prefixed("block");
        self.store.create_table(&table, &["id_block", "x_min", "x_max"])?;
        self.store.insert_rows(
            &table,
            blocks.iter().enumerate().map(|(i, (lo, hi))| {
                row([
                    ("id_block", FieldValue::Int(i as i64 + 1)),
                    ("x_min", FieldValue::Float(*lo)),
                    ("x_max", FieldValue::Float(*hi)),
                ])
            }),
        )?;

        Ok(ProcessOutcome::Succeeded(outputs([
            (params::OUTPUT_TABLE, ParamValue::table(table)),
            (params::OUTPUT_ID_BLOCK, ParamValue::column("id_block")),
        ])))
    }

    /// Lower-scale rows plus the id of the first upper unit containing them
    ///
    /// Points are located by `x`, intervals by their `x_min`.
    async fn relate(&self, args: &BoundArguments, namer: &TableNamer) -> anyhow::Result<ProcessOutcome> {
        let lower = args.table(params::LOWER_TABLE)?;
        let upper = args.table(params::UPPER_TABLE)?;
        let id_up = args.column(params::ID_COLUMN_UP)?;

        let upper_rows = self.store.rows(upper)?;
        let mut columns = self.store.table_columns(lower).await?;
        columns.push(id_up.to_string());

        let own_prefix = format!("{}_", namer.prefix());
        let base = lower
            .strip_prefix(own_prefix.as_str())
            .unwrap_or(lower)
            .to_lowercase();
        let table = namer.prefixed(&format!("{}_{}", base, id_up.trim_start_matches("id_")));

        let mut related = Vec::new();
        for mut r in self.store.rows(lower)? {
            let position = float(&r, "x")
                .or_else(|_| float(&r, "x_min"))
                .with_context(|| format!("locating a row of {}", lower))?;
            let container = upper_rows
                .iter()
                .find(|u| {
                    matches!(
                        (float(u, "x_min"), float(u, "x_max")),
                        (Ok(lo), Ok(hi)) if lo <= position && position <= hi
                    )
                })
                .and_then(|u| u.get(id_up).cloned())
                .unwrap_or(FieldValue::Null);
            r.insert(id_up.to_string(), container);
            related.push(r);
        }

        let column_refs: Vec<&str> = columns.iter().map(String::as_str).collect();
        self.store.create_table(&table, &column_refs)?;
        self.store.insert_rows(&table, related)?;

        Ok(ProcessOutcome::Succeeded(outputs([(
            params::OUTPUT_TABLE,
            ParamValue::table(table),
        )])))
    }
}
