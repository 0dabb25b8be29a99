//! Plain-text table rendering for query results

use crate::db::models::{HistoryEntry, TopTrack};

/// Render rows as left-aligned columns separated by two spaces, each
/// column padded to its widest cell
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let columns = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (idx, cell) in row.iter().take(columns).enumerate() {
            widths[idx] = widths[idx].max(cell.len());
        }
    }

    let mut out = String::new();
    render_row(&mut out, headers.iter().map(|h| h.to_string()), &widths);
    for row in rows {
        render_row(&mut out, row.iter().cloned(), &widths);
    }
    out
}

fn render_row(out: &mut String, cells: impl Iterator<Item = String>, widths: &[usize]) {
    let mut line = String::new();
    // Cells beyond the header columns have no width and are dropped
    for (idx, cell) in cells.take(widths.len()).enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        line.push_str(&format!("{:<width$}", cell, width = widths[idx]));
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

/// History listing with timestamps formatted for humans
pub fn history_table(entries: &[HistoryEntry]) -> String {
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|e| {
            vec![
                e.played_at_utc().format("%Y-%m-%d %H:%M:%S").to_string(),
                e.track_name.clone().unwrap_or_default(),
                e.artist_name.clone().unwrap_or_default(),
                e.track_id.clone(),
            ]
        })
        .collect();
    render_table(&["Played at", "Name", "Artist", "ID"], &rows)
}

/// Top-tracks listing, mirroring the history columns plus the play count
pub fn top_tracks_table(tracks: &[TopTrack]) -> String {
    let rows: Vec<Vec<String>> = tracks
        .iter()
        .map(|t| {
            vec![
                t.play_count.to_string(),
                t.played_first_at_utc().format("%Y-%m-%d %H:%M:%S").to_string(),
                t.track_name.clone().unwrap_or_default(),
                t.artist_name.clone().unwrap_or_default(),
                t.track_id.clone(),
            ]
        })
        .collect();
    render_table(&["#", "Played first", "Name", "Artist", "ID"], &rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_align_to_widest_cell() {
        let rows = vec![
            vec!["1".to_string(), "short".to_string()],
            vec!["22".to_string(), "a much longer value".to_string()],
        ];
        let table = render_table(&["#", "Name"], &rows);

        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "#   Name");
        assert_eq!(lines[1], "1   short");
        assert_eq!(lines[2], "22  a much longer value");
    }

    #[test]
    fn test_extra_cells_beyond_headers_are_ignored() {
        let rows = vec![vec![
            "1".to_string(),
            "name".to_string(),
            "surplus".to_string(),
        ]];
        let table = render_table(&["#", "Name"], &rows);

        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[1], "1  name");
    }

    #[test]
    fn test_null_metadata_renders_empty() {
        let entries = vec![HistoryEntry {
            played_at: 0,
            track_name: None,
            artist_name: None,
            track_id: "t1".to_string(),
        }];
        let table = history_table(&entries);
        assert!(table.contains("t1"));
        assert!(table.contains("1970-01-01"));
    }
}
