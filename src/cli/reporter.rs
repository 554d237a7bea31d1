// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! CLI output reporter with colored formatting

use super::batch::BatchReport;
use super::runner::Conversion;
use crate::document::{Document, NodeRef, Rgb};
use colored::*;
use std::time::Duration;

/// CLI reporter for formatted output
pub struct Reporter;

impl Reporter {
    /// Report one finished conversion
    pub fn report_conversion(result: &Conversion) {
        println!("\n{}", "━".repeat(80).bright_black());
        println!(
            "{} {} → {}",
            "Converted:".bold(),
            result.input.display().to_string().cyan(),
            result.format.to_string().cyan()
        );
        println!("{}", "━".repeat(80).bright_black());
        println!("  {} {}", "Nodes:".bright_black(), result.nodes.to_string().cyan());
        if result.triangles > 0 {
            println!(
                "  {} {}",
                "Triangles:".bright_black(),
                result.triangles.to_string().cyan()
            );
        }
        for output in &result.outputs {
            println!("  {} {}", "Output:".bright_black(), output.display());
        }
        println!(
            "  {} {}",
            "Time:".bright_black(),
            Self::format_duration(result.duration).yellow()
        );
        println!("{}", "━".repeat(80).bright_black());
    }

    /// Print the assembly tree of a document
    pub fn report_document(title: &str, document: &Document) {
        println!("\n{}", "━".repeat(80).bright_black());
        println!("{} {}", "Document:".bold(), title.cyan());
        println!("{}", "━".repeat(80).bright_black());
        for root in document.roots() {
            Self::print_node(root, 0);
        }
        println!(
            "\n  {} {}   {} {}   {} {}",
            "Roots:".bright_black(),
            document.root_ids().len().to_string().cyan(),
            "Nodes:".bright_black(),
            document.node_count().to_string().cyan(),
            "Shapes:".bright_black(),
            document.shapes().len().to_string().cyan()
        );
        println!("{}", "━".repeat(80).bright_black());
    }

    fn print_node(node: NodeRef<'_>, depth: usize) {
        let indent = "  ".repeat(depth + 1);
        let name = node.name().unwrap_or("<unnamed>");
        let mut line = format!("{}{}", indent, if node.is_assembly() { name.bold() } else { name.normal() });
        if let Some(shape) = node.shape() {
            line.push_str(&format!(
                " {}",
                format!("[{}, {} faces]", shape.kind(), shape.face_count()).bright_black()
            ));
        }
        if let Some(color) = node.color() {
            line.push_str(&format!(" {}", Self::swatch(color)));
        }
        println!("{}", line);
        for child in node.children() {
            Self::print_node(child, depth + 1);
        }
    }

    /// Color sample followed by the numeric value
    fn swatch(color: Rgb) -> String {
        let [r, g, b] = color.to_array().map(|c| (c * 255.0).round() as u8);
        format!("{} {}", "■".truecolor(r, g, b), color.to_string().bright_black())
    }

    /// Summary of a batch run, failures listed with their error chain
    pub fn report_batch(report: &BatchReport) {
        println!("\n{}", "═".repeat(80).bright_black());
        println!("{}", "Batch Summary".bold());
        println!("{}", "═".repeat(80).bright_black());
        println!(
            "  {} {}",
            "Total Files:".bright_black(),
            report.total().to_string().cyan()
        );
        println!(
            "  {} {}",
            "Converted:".bright_black(),
            report.converted.len().to_string().green()
        );
        println!(
            "  {} {}",
            "Failed:".bright_black(),
            if report.failures.is_empty() {
                "0".green()
            } else {
                report.failures.len().to_string().red()
            }
        );
        println!(
            "  {} {}",
            "Time:".bright_black(),
            Self::format_duration(report.duration).yellow()
        );

        if !report.failures.is_empty() {
            println!("\n  {}", "Failures:".red().bold());
            for failure in &report.failures {
                println!("    {} {}", "❌".red(), failure.input.display());
                println!("       {}", failure.error.bright_black());
            }
        }
        println!("{}", "═".repeat(80).bright_black());
    }

    /// Report error
    pub fn report_error(message: &str) {
        eprintln!("\n{} {}", "❌ Error:".red().bold(), message);
    }

    /// Report warning
    pub fn report_warning(message: &str) {
        println!("\n{} {}", "⚠️  Warning:".yellow().bold(), message);
    }

    /// Report info
    pub fn report_info(message: &str) {
        println!("{} {}", "ℹ️".bright_blue(), message);
    }

    /// Format duration for display
    pub fn format_duration(duration: Duration) -> String {
        let micros = duration.as_micros();

        if micros < 1_000 {
            format!("{}µs", micros)
        } else if micros < 1_000_000 {
            format!("{:.2}ms", micros as f64 / 1_000.0)
        } else {
            format!("{:.2}s", micros as f64 / 1_000_000.0)
        }
    }

    /// Print success message
    pub fn success(message: &str) {
        println!("{} {}", "✅".green(), message.green());
    }
}
