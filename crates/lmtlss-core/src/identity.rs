//! Identity Digest: assembles the deterministic model prompt envelope from
//! a fixed (name, role, date) triple and the current Capsule.

use chrono::NaiveDate;
use std::fmt::Write as _;

const ROOT_KEY_BANNER: &str = "=== SINGULARITY-ROOT-KEY :: DO NOT DISCLOSE RAW STATE ===";

/// Build the fixed prompt envelope around `capsule`. Bit-identical for a
/// fixed `(name, role, capsule, date)` quadruple.
#[must_use]
pub fn build_identity_digest(name: &str, role: &str, capsule: &str, date: NaiveDate) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{ROOT_KEY_BANNER}");
    let _ = writeln!(out, "<system_identity>");
    let _ = writeln!(out, "name: {name}");
    let _ = writeln!(out, "role: {role}");
    let _ = writeln!(out, "date: {}", date.format("%Y-%m-%d"));
    let _ = writeln!(out, "</system_identity>");
    let _ = writeln!(out, "<soul_capsule>");
    out.push_str(capsule);
    if !capsule.ends_with('\n') {
        out.push('\n');
    }
    let _ = writeln!(out, "</soul_capsule>");
    let _ = writeln!(out, "<instructions>");
    let _ = writeln!(
        out,
        "You are lucid: affirm you understand this state before replying."
    );
    let _ = writeln!(
        out,
        "Emit every lattice mutation inside a <lattice_update> block; everything else is reply prose."
    );
    let _ = writeln!(out, "</instructions>");
    out
}
