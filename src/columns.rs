use crate::error::AnalysisError;
use crate::table::Table;

/// Headers containing any of these (case-insensitive substring) are never
/// treated as subjects, however numeric their cells look.
const EXCLUDE_KEYWORDS: [&str; 24] = [
    "id",
    "adm",
    "admission",
    "index",
    "no.",
    "number",
    "name",
    "student",
    "phone",
    "stream",
    "gender",
    "sex",
    "total",
    "sum",
    "average",
    "avg",
    "mean",
    "rank",
    "position",
    "pos",
    "grade",
    "points",
    "comment",
    "remark",
];

const NAME_CANDIDATES: [&str; 5] = ["name", "student name", "student", "names", "full name"];

const ID_KEYWORDS_PRIMARY: [&str; 3] = ["adm", "reg", "upi"];
const ID_KEYWORDS_SECONDARY: [&str; 3] = ["index", "student id", "unique"];

/// Split the user-supplied ignore string ("CAT 1, assignment") into
/// lowercased terms, dropping blanks.
pub fn parse_custom_ignores(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or("")
        .split(',')
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .collect()
}

/// Columns holding subject scores: every non-empty cell numeric, at least one
/// non-empty cell, and a header free of identity/aggregate keywords.
pub fn subject_columns(
    table: &Table,
    custom_ignores: &[String],
) -> Result<Vec<usize>, AnalysisError> {
    let mut subjects = Vec::new();
    for col in 0..table.width() {
        if !is_numeric_column(table, col) {
            continue;
        }
        let header = table.headers[col].to_lowercase();
        let excluded = EXCLUDE_KEYWORDS.iter().any(|kw| header.contains(kw))
            || custom_ignores.iter().any(|kw| header.contains(kw.as_str()));
        if !excluded {
            subjects.push(col);
        }
    }
    if subjects.is_empty() {
        return Err(AnalysisError::NoSubjectsDetected);
    }
    Ok(subjects)
}

/// First column whose header is exactly one of the known name headers.
pub fn name_column(table: &Table) -> Option<usize> {
    table.headers.iter().position(|h| {
        let h = h.trim().to_lowercase();
        NAME_CANDIDATES.contains(&h.as_str())
    })
}

/// First column whose header suggests an admission/registration number,
/// falling back to weaker index-style identifiers.
pub fn id_column(table: &Table) -> Option<usize> {
    let matches_any = |col: usize, keywords: &[&str]| {
        let header = table.headers[col].to_lowercase();
        keywords.iter().any(|kw| header.contains(kw))
    };
    (0..table.width())
        .find(|&col| matches_any(col, &ID_KEYWORDS_PRIMARY))
        .or_else(|| (0..table.width()).find(|&col| matches_any(col, &ID_KEYWORDS_SECONDARY)))
}

fn is_numeric_column(table: &Table, col: usize) -> bool {
    let mut non_empty = 0usize;
    for cell in table.column(col) {
        if cell.is_empty() {
            continue;
        }
        if cell.as_number().is_none() {
            return false;
        }
        non_empty += 1;
    }
    non_empty > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::parse_table;

    fn sample() -> Table {
        let csv = "\
Name,Adm No,Math,English,Kiswahili,Stream,Total
Alice,4344.0,78,65,,North,143
Bob,4351,55,71,80,North,206
Carol,4360,62,,74,South,136
";
        parse_table("marks.csv", csv.as_bytes()).unwrap()
    }

    #[test]
    fn numeric_non_identity_columns_become_subjects() {
        let table = sample();
        let cols = subject_columns(&table, &[]).unwrap();
        let names: Vec<&str> = cols.iter().map(|&c| table.headers[c].as_str()).collect();
        assert_eq!(names, vec!["Math", "English", "Kiswahili"]);
    }

    #[test]
    fn custom_ignores_remove_matching_subjects() {
        let table = sample();
        let ignores = parse_custom_ignores(Some(" english , ,KISWAHILI"));
        assert_eq!(ignores, vec!["english", "kiswahili"]);
        let cols = subject_columns(&table, &ignores).unwrap();
        assert_eq!(cols.len(), 1);
        assert_eq!(table.headers[cols[0]], "Math");
    }

    #[test]
    fn everything_excluded_reports_no_subjects() {
        let csv = "Name,Adm No,Total\nAlice,4344,143\n";
        let table = parse_table("marks.csv", csv.as_bytes()).unwrap();
        let err = subject_columns(&table, &[]).unwrap_err();
        assert!(matches!(err, AnalysisError::NoSubjectsDetected));
    }

    #[test]
    fn exclusion_terms_match_as_substrings() {
        // The keyword "id" also knocks out a genuine subject named
        // "Biology ID"; an accepted false positive of substring matching.
        let csv = "Name,Biology ID,Math\nAlice,70,80\n";
        let table = parse_table("marks.csv", csv.as_bytes()).unwrap();
        let cols = subject_columns(&table, &[]).unwrap();
        assert_eq!(cols.len(), 1);
        assert_eq!(table.headers[cols[0]], "Math");
    }

    #[test]
    fn mixed_text_column_is_not_a_subject() {
        let csv = "Name,Math,Notes\nAlice,70,good\nBob,60,5\n";
        let table = parse_table("marks.csv", csv.as_bytes()).unwrap();
        let cols = subject_columns(&table, &[]).unwrap();
        assert_eq!(cols.len(), 1);
        assert_eq!(table.headers[cols[0]], "Math");
    }

    #[test]
    fn all_empty_column_is_not_a_subject() {
        let csv = "Name,Math,Physics\nAlice,70,\nBob,60,\n";
        let table = parse_table("marks.csv", csv.as_bytes()).unwrap();
        let cols = subject_columns(&table, &[]).unwrap();
        assert_eq!(table.headers[cols[0]], "Math");
        assert_eq!(cols.len(), 1);
    }

    #[test]
    fn name_column_needs_an_exact_header() {
        let table = sample();
        assert_eq!(name_column(&table), Some(0));

        let csv = "Student Name,Math\nAlice,70\n";
        let table = parse_table("m.csv", csv.as_bytes()).unwrap();
        assert_eq!(name_column(&table), Some(0));

        let csv = "Nickname,Math\nAce,70\n";
        let table = parse_table("m.csv", csv.as_bytes()).unwrap();
        assert_eq!(name_column(&table), None);
    }

    #[test]
    fn id_column_prefers_admission_style_headers() {
        let csv = "Name,Index No,Adm No,Math\nAlice,12,4344,70\n";
        let table = parse_table("m.csv", csv.as_bytes()).unwrap();
        assert_eq!(id_column(&table).map(|c| table.headers[c].as_str()), Some("Adm No"));

        let csv = "Name,Index No,Math\nAlice,12,70\n";
        let table = parse_table("m.csv", csv.as_bytes()).unwrap();
        assert_eq!(id_column(&table).map(|c| table.headers[c].as_str()), Some("Index No"));

        let csv = "Name,Math\nAlice,70\n";
        let table = parse_table("m.csv", csv.as_bytes()).unwrap();
        assert_eq!(id_column(&table), None);
    }
}
