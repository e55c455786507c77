use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};

/// Reads one class label per line, in class-index order. Blank lines are skipped.
pub fn load_class_labels(filepath: &Path) -> io::Result<Vec<String>> {
    let file = File::open(filepath)?;
    parse_class_labels(io::BufReader::new(file))
}

fn parse_class_labels(reader: impl BufRead) -> io::Result<Vec<String>> {
    let mut labels = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        let label = line.trim();
        if label.is_empty() {
            continue;
        }
        labels.push(label.to_string());
    }

    if labels.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Labels file contains no class labels",
        ));
    }

    Ok(labels)
}
