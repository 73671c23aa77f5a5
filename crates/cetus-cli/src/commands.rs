//! Subcommands and their handlers.
//!
//! Handlers are generic over [`IncidentStore`] and write their report to any
//! [`Write`], so they can be driven against an in-memory store in tests.

use std::{collections::BTreeSet, io::Write};

use anyhow::Context as _;
use cetus_core::{
  case::{breadth, earliest_datetime, latest_datetime},
  ids::{CaseId, GearAttributeId, TaxonId},
  store::IncidentStore,
  taxon::{NewTaxon, Rank, parse_common_names},
};
use chrono::Local;
use clap::Subcommand;
use tracing::info;

#[derive(Debug, Subcommand)]
pub enum Command {
  /// Edit or inspect the taxonomic hierarchy.
  #[command(subcommand)]
  Taxon(TaxonCommand),

  /// Edit or inspect the gear attribute hierarchy.
  #[command(subcommand)]
  Gear(GearCommand),

  /// Inspect and maintain cases.
  #[command(subcommand)]
  Cases(CasesCommand),
}

#[derive(Debug, Subcommand)]
pub enum TaxonCommand {
  /// Add a taxon.
  Add {
    /// Scientific name of the taxon alone, e.g. `novaeangliae`.
    name: String,
    #[arg(long)]
    rank: Rank,
    /// Comma-separated common names.
    #[arg(long)]
    common_names: Option<String>,
  },
  /// Make SUBTYPE imply SUPERTYPE.
  Link { subtype: i64, supertype: i64 },
  /// Remove the edge SUBTYPE -> SUPERTYPE.
  Unlink { subtype: i64, supertype: i64 },
  /// List taxa without a supertype.
  Roots,
  /// Print a taxon and everything below it.
  Tree { taxon: i64 },
}

#[derive(Debug, Subcommand)]
pub enum GearCommand {
  /// Add a gear attribute.
  Add { name: String },
  /// Make SUBTYPE imply SUPERTYPE.
  Link { subtype: i64, supertype: i64 },
  /// Remove the edge SUBTYPE -> SUPERTYPE.
  Unlink { subtype: i64, supertype: i64 },
  /// List attributes without a supertype.
  Roots,
  /// Print an attribute and everything below it.
  Tree { attribute: i64 },
}

#[derive(Debug, Subcommand)]
pub enum CasesCommand {
  /// List live cases in date order.
  List,
  /// Show one case with its name and number history.
  Show { case: i64 },
  /// Fold SOURCE into DESTINATION.
  Merge { source: i64, destination: i64 },
  /// Recompute derived fields of one case, or of every live case.
  Recompute { case: Option<i64> },
}

pub async fn run<S: IncidentStore>(
  store: &S,
  command: Command,
  out: &mut impl Write,
) -> anyhow::Result<()> {
  match command {
    Command::Taxon(cmd) => taxon(store, cmd, out).await,
    Command::Gear(cmd) => gear(store, cmd, out).await,
    Command::Cases(cmd) => cases(store, cmd, out).await,
  }
}

// ─── Taxa ────────────────────────────────────────────────────────────────────

async fn taxon_line<S: IncidentStore>(store: &S, id: TaxonId) -> anyhow::Result<String> {
  let taxon = store
    .get_taxon(id)
    .await?
    .with_context(|| format!("no taxon {id}"))?;
  let name = store
    .scientific_name(id)
    .await?
    .unwrap_or_else(|| taxon.name.clone());
  let mut line = format!("{id}  {name} ({})", taxon.rank);
  if !taxon.common_names.is_empty() {
    line.push_str(&format!(" [{}]", taxon.common_names.join(", ")));
  }
  Ok(line)
}

async fn taxon<S: IncidentStore>(
  store: &S,
  cmd: TaxonCommand,
  out: &mut impl Write,
) -> anyhow::Result<()> {
  match cmd {
    TaxonCommand::Add { name, rank, common_names } => {
      let mut input = NewTaxon::new(name, rank);
      input.common_names = common_names.as_deref().map(parse_common_names).unwrap_or_default();
      let taxon = store.add_taxon(input).await?;
      info!(taxon = %taxon.id, "added taxon");
      writeln!(out, "{}", taxon_line(store, taxon.id).await?)?;
    }
    TaxonCommand::Link { subtype, supertype } => {
      let added = store.add_supertype(TaxonId(subtype), TaxonId(supertype)).await?;
      writeln!(out, "{}", if added { "linked" } else { "already linked" })?;
    }
    TaxonCommand::Unlink { subtype, supertype } => {
      let removed = store.remove_supertype(TaxonId(subtype), TaxonId(supertype)).await?;
      writeln!(out, "{}", if removed { "unlinked" } else { "not linked" })?;
    }
    TaxonCommand::Roots => {
      for id in store.dag_roots::<TaxonId>().await? {
        writeln!(out, "{}", taxon_line(store, id).await?)?;
      }
    }
    TaxonCommand::Tree { taxon } => {
      let root = TaxonId(taxon);
      let nodes = store.with_descendants(root).await?;
      let in_tree: BTreeSet<TaxonId> = nodes.iter().copied().collect();
      for id in nodes {
        let depth = store
          .implied_supertypes(id)
          .await?
          .intersection(&in_tree)
          .count();
        writeln!(out, "{}{}", "  ".repeat(depth), taxon_line(store, id).await?)?;
      }
    }
  }
  Ok(())
}

// ─── Gear attributes ─────────────────────────────────────────────────────────

async fn gear_line<S: IncidentStore>(store: &S, id: GearAttributeId) -> anyhow::Result<String> {
  let attribute = store
    .get_gear_attribute(id)
    .await?
    .with_context(|| format!("no gear attribute {id}"))?;
  Ok(format!("{id}  {}", attribute.name))
}

async fn gear<S: IncidentStore>(
  store: &S,
  cmd: GearCommand,
  out: &mut impl Write,
) -> anyhow::Result<()> {
  match cmd {
    GearCommand::Add { name } => {
      let attribute = store.add_gear_attribute(name).await?;
      writeln!(out, "{}", gear_line(store, attribute.id).await?)?;
    }
    GearCommand::Link { subtype, supertype } => {
      let added = store
        .add_supertype(GearAttributeId(subtype), GearAttributeId(supertype))
        .await?;
      writeln!(out, "{}", if added { "linked" } else { "already linked" })?;
    }
    GearCommand::Unlink { subtype, supertype } => {
      let removed = store
        .remove_supertype(GearAttributeId(subtype), GearAttributeId(supertype))
        .await?;
      writeln!(out, "{}", if removed { "unlinked" } else { "not linked" })?;
    }
    GearCommand::Roots => {
      for id in store.dag_roots::<GearAttributeId>().await? {
        writeln!(out, "{}", gear_line(store, id).await?)?;
      }
    }
    GearCommand::Tree { attribute } => {
      let root = GearAttributeId(attribute);
      let nodes = store.with_descendants(root).await?;
      let in_tree: BTreeSet<GearAttributeId> = nodes.iter().copied().collect();
      for id in nodes {
        let depth = store
          .implied_supertypes(id)
          .await?
          .intersection(&in_tree)
          .count();
        writeln!(out, "{}{}", "  ".repeat(depth), gear_line(store, id).await?)?;
      }
    }
  }
  Ok(())
}

// ─── Cases ───────────────────────────────────────────────────────────────────

async fn cases<S: IncidentStore>(
  store: &S,
  cmd: CasesCommand,
  out: &mut impl Write,
) -> anyhow::Result<()> {
  match cmd {
    CasesCommand::List => {
      for case in store.list_cases().await? {
        writeln!(
          out,
          "{}  {}  {}",
          case.id,
          case.name().unwrap_or("(unnamed)"),
          case.validity
        )?;
      }
    }
    CasesCommand::Show { case } => show_case(store, CaseId(case), out).await?,
    CasesCommand::Merge { source, destination } => {
      let merged = store.merge_cases(CaseId(source), CaseId(destination)).await?;
      writeln!(
        out,
        "merged case {source} into {}  {}",
        merged.id,
        merged.name().unwrap_or("(unnamed)")
      )?;
    }
    CasesCommand::Recompute { case: Some(id) } => {
      let case = store.recompute_case(CaseId(id)).await?;
      writeln!(out, "{}  {}", case.id, case.name().unwrap_or("(unnamed)"))?;
    }
    CasesCommand::Recompute { case: None } => {
      let count = store.recompute_all_cases().await?;
      writeln!(out, "recomputed {count} case(s)")?;
    }
  }
  Ok(())
}

/// Short taxon form (`M. novaeangliae`), built from the taxon's ancestors.
async fn taxon_display<S: IncidentStore>(store: &S, id: TaxonId) -> anyhow::Result<String> {
  let taxon = store
    .get_taxon(id)
    .await?
    .with_context(|| format!("no taxon {id}"))?;
  let mut ancestors = Vec::new();
  for ancestor in store.implied_supertypes(id).await? {
    if let Some(t) = store.get_taxon(ancestor).await? {
      ancestors.push(t);
    }
  }
  Ok(taxon.display_name(&ancestors))
}

async fn show_case<S: IncidentStore>(
  store: &S,
  id: CaseId,
  out: &mut impl Write,
) -> anyhow::Result<()> {
  let case = store
    .get_case(id)
    .await?
    .with_context(|| format!("no case {id}"))?;
  let animal = store
    .get_animal(case.animal_id)
    .await?
    .with_context(|| format!("no animal {}", case.animal_id))?;
  let observations = store.case_observations(id).await?;
  let numbers = store.case_numbers(id).await?;
  let gear_retrieved = match store.case_gear_retrieved(id).await? {
    Some(true) => "yes",
    Some(false) => "no",
    None => "unknown",
  };

  writeln!(out, "case {}  {}", case.id, case.name().unwrap_or("(unnamed)"))?;
  writeln!(out, "kind:          {}", case.kind())?;
  writeln!(out, "animal:        {} ({})", animal.label(), animal.id)?;
  let aliases = animal.names();
  if !aliases.is_empty() {
    writeln!(out, "known as:      {}", aliases.join(", "))?;
  }
  if let Some(taxon) = animal.taxon(store.probable_taxon(animal.id).await?) {
    writeln!(out, "taxon:         {}", taxon_display(store, taxon).await?)?;
  }
  if let Some(gender) = animal.gender(store.probable_gender(animal.id).await?) {
    writeln!(out, "gender:        {}", gender.label())?;
  }
  if animal.is_dead(Local::now().date_naive()) {
    writeln!(out, "dead:          yes")?;
  }
  writeln!(out, "validity:      {}", case.validity)?;
  match &case.date {
    Some(date) => writeln!(out, "date:          {date}")?,
    None => writeln!(out, "date:          unknown")?,
  }
  if let (Some(earliest), Some(latest), Some(span)) = (
    earliest_datetime(&observations),
    latest_datetime(&observations),
    breadth(&observations),
  ) {
    writeln!(
      out,
      "observed:      {earliest} to {latest} ({} h)",
      span.num_hours()
    )?;
  }
  if let Some(number) = case.current_number {
    writeln!(out, "number:        {}", number.identifier())?;
  }
  writeln!(out, "observations:  {}", observations.len())?;
  writeln!(out, "gear present:  {}", store.case_gear_present(id).await?)?;
  writeln!(out, "gear retrieved: {gear_retrieved}")?;
  if !numbers.is_empty() {
    let history: Vec<String> = numbers.iter().map(|n| n.identifier()).collect();
    writeln!(out, "number history: {}", history.join(", "))?;
  }
  if case.names.len() > 1 {
    let names: Vec<&str> = case.names.iter().collect();
    writeln!(out, "name history:  {}", names.join(" | "))?;
  }
  if let Some(into) = case.merged_into {
    writeln!(out, "merged into:   {into}")?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use cetus_core::{
    animal::{Gender, NewAnimal, NewObservation},
    case::{CaseDetail, NewCase},
    datetime::UncertainDateTime,
    ids::AnimalId,
  };
  use cetus_store_sqlite::SqliteStore;

  use super::*;

  async fn store() -> SqliteStore {
    SqliteStore::open_in_memory()
      .await
      .expect("in-memory store")
  }

  async fn output(store: &SqliteStore, command: Command) -> String {
    let mut out = Vec::new();
    run(store, command, &mut out).await.unwrap();
    String::from_utf8(out).unwrap()
  }

  async fn dated_case(s: &SqliteStore, animal: AnimalId, day: u32) -> CaseId {
    let case = s
      .add_case(NewCase::new(animal, CaseDetail::Stranding))
      .await
      .unwrap();
    let date = UncertainDateTime::ymd(2003, 5, day).unwrap();
    let obs = s
      .add_observation(NewObservation::new(animal, date))
      .await
      .unwrap();
    s.link_observation(case.id, obs.id).await.unwrap();
    case.id
  }

  #[tokio::test]
  async fn taxon_tree_is_indented_by_depth() {
    let s = store().await;
    let add = |name: &str, rank| {
      Command::Taxon(TaxonCommand::Add { name: name.into(), rank, common_names: None })
    };
    output(&s, add("Megaptera", Rank::Genus)).await;
    let added = output(
      &s,
      Command::Taxon(TaxonCommand::Add {
        name:         "novaeangliae".into(),
        rank:         Rank::Species,
        common_names: Some("humpback whale, humpback".into()),
      }),
    )
    .await;
    assert_eq!(added, "2  novaeangliae (species) [humpback whale, humpback]\n");

    let linked =
      output(&s, Command::Taxon(TaxonCommand::Link { subtype: 2, supertype: 1 })).await;
    assert_eq!(linked, "linked\n");

    let tree = output(&s, Command::Taxon(TaxonCommand::Tree { taxon: 1 })).await;
    assert_eq!(
      tree,
      "1  Megaptera (genus)\n  2  Megaptera novaeangliae (species) [humpback whale, humpback]\n"
    );
    let roots = output(&s, Command::Taxon(TaxonCommand::Roots)).await;
    assert_eq!(roots, "1  Megaptera (genus)\n");
  }

  #[tokio::test]
  async fn gear_cycle_is_reported_as_an_error() {
    let s = store().await;
    output(&s, Command::Gear(GearCommand::Add { name: "line".into() })).await;
    output(&s, Command::Gear(GearCommand::Add { name: "long line".into() })).await;
    output(&s, Command::Gear(GearCommand::Link { subtype: 2, supertype: 1 })).await;

    let mut out = Vec::new();
    let err = run(&s, Command::Gear(GearCommand::Link { subtype: 1, supertype: 2 }), &mut out)
      .await
      .unwrap_err();
    assert!(err.to_string().contains("cycle"), "{err}");

    let tree = output(&s, Command::Gear(GearCommand::Tree { attribute: 1 })).await;
    assert_eq!(tree, "1  line\n  2  long line\n");
  }

  #[tokio::test]
  async fn show_lists_number_and_observations() {
    let s = store().await;
    let a = s.add_animal(NewAnimal::default()).await.unwrap().id;
    let case = dated_case(&s, a, 2).await;

    let shown = output(&s, Command::Cases(CasesCommand::Show { case: case.get() })).await;
    assert!(shown.contains("number:        2003#1"), "{shown}");
    assert!(shown.contains("observations:  1"), "{shown}");
    assert!(shown.contains("gear retrieved: unknown"), "{shown}");
    assert!(shown.contains("kind:          stranding"), "{shown}");
  }

  #[tokio::test]
  async fn show_describes_the_animal_and_observation_window() {
    let s = store().await;
    let genus = s.add_taxon(NewTaxon::new("Megaptera", Rank::Genus)).await.unwrap().id;
    let species = s
      .add_taxon(NewTaxon::new("novaeangliae", Rank::Species))
      .await
      .unwrap()
      .id;
    s.add_supertype(species, genus).await.unwrap();
    let a = s
      .add_animal(NewAnimal {
        field_number: Some("MH-03-01".into()),
        name: Some("Salt, Pepper".into()),
        necropsy: true,
        ..Default::default()
      })
      .await
      .unwrap()
      .id;
    let case = s
      .add_case(NewCase::new(a, CaseDetail::Stranding))
      .await
      .unwrap();
    let mut obs = NewObservation::new(a, UncertainDateTime::ymd(2003, 5, 2).unwrap());
    obs.taxon = Some(species);
    obs.gender = Some(Gender::Female);
    let obs = s.add_observation(obs).await.unwrap();
    s.link_observation(case.id, obs.id).await.unwrap();

    let shown = output(&s, Command::Cases(CasesCommand::Show { case: case.id.get() })).await;
    assert!(shown.contains(&format!("animal:        MH-03-01 ({a})")), "{shown}");
    assert!(shown.contains("known as:      Salt, Pepper"), "{shown}");
    assert!(shown.contains("taxon:         M. novaeangliae"), "{shown}");
    assert!(shown.contains("gender:        female"), "{shown}");
    assert!(shown.contains("dead:          yes"), "{shown}");
    assert!(
      shown.contains("observed:      2003-05-02 00:00:00 to 2003-05-03 00:00:00 (24 h)"),
      "{shown}"
    );
  }

  #[tokio::test]
  async fn merged_case_drops_out_of_the_list() {
    let s = store().await;
    let a = s.add_animal(NewAnimal::default()).await.unwrap().id;
    let first = dated_case(&s, a, 2).await;
    let second = dated_case(&s, a, 3).await;

    let merged = output(
      &s,
      Command::Cases(CasesCommand::Merge { source: second.get(), destination: first.get() }),
    )
    .await;
    assert!(merged.starts_with(&format!("merged case {second} into {first}")), "{merged}");

    let listed = output(&s, Command::Cases(CasesCommand::List)).await;
    assert_eq!(listed.lines().count(), 1, "{listed}");
    assert!(listed.starts_with(&format!("{first}  2003#1")), "{listed}");

    let shown = output(&s, Command::Cases(CasesCommand::Show { case: second.get() })).await;
    assert!(shown.contains(&format!("merged into:   {first}")), "{shown}");

    let recomputed = output(&s, Command::Cases(CasesCommand::Recompute { case: None })).await;
    assert_eq!(recomputed, "recomputed 1 case(s)\n");
  }
}
