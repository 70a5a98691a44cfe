//! Subcommands that work directly on document files.

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use texmerge_core::conflict::resolver::parse_assignment;
use texmerge_core::section::{replace_section_content, section_at_line};
use texmerge_core::{
    build_outline_tree, diff_sections, normalize_math_whitespace, parse_sections, OutlineNode,
    ResolutionMap, Section, ThreeWayMerger,
};

use crate::style;

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_or_print(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            println!("{}", text);
            Ok(())
        }
    }
}

pub fn cmd_normalize(file: &Path) -> Result<()> {
    let source = read_source(file)?;
    print!("{}", normalize_math_whitespace(&source));
    Ok(())
}

pub fn cmd_sections(file: &Path, line: Option<usize>, json: bool) -> Result<()> {
    let source = read_source(file)?;
    let sections = parse_sections(&source);
    let selected: Vec<&Section> = match line {
        Some(line) => section_at_line(&sections, line)
            .into_iter()
            .collect(),
        None => sections.iter().collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&selected)?);
        return Ok(());
    }

    if selected.is_empty() {
        println!("{}", style::warn("No section contains that line"));
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Key", "Level", "Title", "Lines", "Bytes"]);
    for s in &selected {
        table.add_row(vec![
            Cell::new(&s.key),
            Cell::new(s.level.command()),
            Cell::new(&s.title),
            Cell::new(format!("{}-{}", s.line_start, s.line_end)),
            Cell::new(s.content.len()),
        ]);
    }
    println!("{}", table);
    Ok(())
}

pub fn cmd_outline(file: &Path, json: bool) -> Result<()> {
    let source = read_source(file)?;
    let tree = build_outline_tree(&parse_sections(&source));

    if json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
        return Ok(());
    }

    fn print_node(node: &OutlineNode, depth: usize) {
        println!(
            "{}{} {}",
            "  ".repeat(depth),
            style::header(&node.title),
            style::dim(&format!("[{}] lines {}-{}", node.key, node.line_start, node.line_end))
        );
        for child in &node.children {
            print_node(child, depth + 1);
        }
    }
    for root in &tree {
        print_node(root, 0);
    }
    Ok(())
}

pub fn cmd_diff(left: &Path, right: &Path, json: bool) -> Result<()> {
    let diff = diff_sections(&read_source(left)?, &read_source(right)?);

    if json {
        println!("{}", serde_json::to_string_pretty(&diff)?);
        return Ok(());
    }

    if diff.is_identical() {
        println!("{}", style::success("No section changes"));
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Change", "Key", "Title"]);
    for s in &diff.added {
        table.add_row(vec![
            Cell::new("added").fg(Color::Green),
            Cell::new(&s.key),
            Cell::new(&s.title),
        ]);
    }
    for s in &diff.removed {
        table.add_row(vec![
            Cell::new("removed").fg(Color::Red),
            Cell::new(&s.key),
            Cell::new(&s.title),
        ]);
    }
    for m in &diff.modified {
        table.add_row(vec![
            Cell::new("modified").fg(Color::Yellow),
            Cell::new(m.key()),
            Cell::new(&m.right.title),
        ]);
    }
    println!("{}", table);

    if !diff.reordered.is_empty() {
        println!("{}", style::warn(&format!("Reordered: {}", diff.reordered.join(", "))));
    }
    println!("{}", style::dim(&diff.summary().to_string()));
    Ok(())
}

pub fn cmd_merge(
    base: &Path,
    left: &Path,
    right: &Path,
    assignments: &[String],
    output: Option<&Path>,
) -> Result<()> {
    let mut resolutions = ResolutionMap::new();
    for arg in assignments {
        let (key, resolution) = parse_assignment(arg)?;
        resolutions.insert(key, resolution);
    }

    let outcome = ThreeWayMerger::merge_detailed(
        &read_source(base)?,
        &read_source(left)?,
        &read_source(right)?,
        &resolutions,
    );
    write_or_print(output, &outcome.merged_content)?;

    // Keep stdout clean when the document itself goes there.
    if let Some(path) = output {
        println!(
            "{}",
            style::success(&format!(
                "Merged {} section(s) into {}",
                outcome.from_left.len() + outcome.from_right.len() + outcome.conflict_keys.len(),
                path.display()
            ))
        );
    }
    if outcome.has_conflicts() {
        eprintln!(
            "{}",
            style::warn(&format!(
                "Conflict markers left in: {}",
                outcome.conflict_keys.join(", ")
            ))
        );
    }
    Ok(())
}

pub fn cmd_replace(file: &Path, key: &str, content: &Path, output: Option<&Path>) -> Result<()> {
    let source = read_source(file)?;
    let sections = parse_sections(&source);
    let section = sections
        .iter()
        .find(|s| s.key == key)
        .ok_or_else(|| anyhow::anyhow!("section '{}' not found in {}", key, file.display()))?;
    let new_content = read_source(content)?;
    let replaced = replace_section_content(&source, section, new_content.trim_end_matches('\n'));
    write_or_print(output, &replaced)
}
