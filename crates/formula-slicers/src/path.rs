pub fn rels_for_part(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file_name)) => format!("{dir}/_rels/{file_name}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship `target` written in `source_part`'s rels into a part name.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    let target = target.split('#').next().unwrap_or(target);
    if target.is_empty() {
        return normalize(source_part);
    }
    if let Some(target) = target.strip_prefix('/') {
        return normalize(target);
    }

    let base_dir = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    normalize(&format!("{base_dir}/{target}"))
}

/// Inverse of [`resolve_target`]: the relative target that reaches `target_part` from
/// `source_part` (e.g. `xl/worksheets/sheet1.xml` -> `xl/slicers/slicer1.xml` gives
/// `../slicers/slicer1.xml`).
pub fn relative_target(source_part: &str, target_part: &str) -> String {
    let source = normalize(source_part);
    let target = normalize(target_part);
    let source_dir: Vec<&str> = match source.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    let target_segments: Vec<&str> = target.split('/').collect();
    let (target_dir, file_name) = target_segments.split_at(target_segments.len().saturating_sub(1));

    let common = source_dir
        .iter()
        .zip(target_dir.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out: Vec<&str> = Vec::new();
    out.extend(std::iter::repeat("..").take(source_dir.len() - common));
    out.extend(&target_dir[common..]);
    out.extend(file_name);
    out.join("/")
}

fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.join("/")
}
