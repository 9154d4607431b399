//! Dashboard panels the `watch` command can subscribe to.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelKind {
  Stats,
  Trends,
  Heatmap,
  Status,
  Country,
  History,
  Weather,
}

#[derive(Debug, Clone)]
pub struct Panel {
  pub kind: PanelKind,
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All watchable panels, in display order
pub const PANELS: &[Panel] = &[
  Panel {
    kind: PanelKind::Stats,
    name: "stats",
    aliases: &["s", "overview"],
    description: "Headline transaction and alert counts",
  },
  Panel {
    kind: PanelKind::Trends,
    name: "trends",
    aliases: &["t", "trend"],
    description: "Purchase trends by category",
  },
  Panel {
    kind: PanelKind::Heatmap,
    name: "heatmap",
    aliases: &["h", "alerts"],
    description: "Regions with anomalous purchasing",
  },
  Panel {
    kind: PanelKind::Status,
    name: "status",
    aliases: &["outbreak"],
    description: "Outbreak classification for the watched pincode",
  },
  Panel {
    kind: PanelKind::Country,
    name: "country",
    aliases: &["c", "national"],
    description: "National case totals",
  },
  Panel {
    kind: PanelKind::History,
    name: "history",
    aliases: &["hist", "timeline"],
    description: "Recent daily case history",
  },
  Panel {
    kind: PanelKind::Weather,
    name: "weather",
    aliases: &["w"],
    description: "Current weather in the configured city",
  },
];

/// Look up a panel by exact name or alias, case-insensitively.
pub fn find(input: &str) -> Option<&'static Panel> {
  let input = input.trim().to_lowercase();
  PANELS
    .iter()
    .find(|p| p.name == input || p.aliases.contains(&input.as_str()))
}

/// Resolve a `--only` selection. An empty selection means every panel.
pub fn select(names: &[String]) -> Result<Vec<PanelKind>, String> {
  if names.is_empty() {
    return Ok(PANELS.iter().map(|p| p.kind).collect());
  }

  let mut kinds = Vec::new();
  for name in names {
    let panel = find(name).ok_or_else(|| {
      let known: Vec<&str> = PANELS.iter().map(|p| p.name).collect();
      format!("unknown panel '{}' (expected one of: {})", name, known.join(", "))
    })?;
    if !kinds.contains(&panel.kind) {
      kinds.push(panel.kind);
    }
  }
  Ok(kinds)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_selection_returns_all() {
    let kinds = select(&[]).unwrap();
    assert_eq!(kinds.len(), PANELS.len());
  }

  #[test]
  fn test_alias_match() {
    assert_eq!(find("w").unwrap().kind, PanelKind::Weather);
    assert_eq!(find("Outbreak").unwrap().kind, PanelKind::Status);
  }

  #[test]
  fn test_duplicates_collapse() {
    let kinds = select(&["stats".to_string(), "s".to_string()]).unwrap();
    assert_eq!(kinds, vec![PanelKind::Stats]);
  }

  #[test]
  fn test_unknown_panel() {
    let err = select(&["radar".to_string()]).unwrap_err();
    assert!(err.contains("unknown panel 'radar'"));
  }
}
