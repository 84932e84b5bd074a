//! Prompts sent to the language-model providers.

/// Snippet operations the editor's engine understands, with one example each.
pub const OPERATIONS: &[(&str, &str)] = &[
    ("drop rows with missing values", "df = df.dropna(subset=['Age'])"),
    ("fill missing values", "df = df.fillna({'Age': 0})"),
    ("drop columns or rows", "df = df.drop(columns=['Age'])"),
    ("rename columns", "df = df.rename(columns={'A': 'B'})"),
    ("reorder or select columns", "df = df[['B', 'A']]"),
    ("filter rows", "df = df[df['Age'] > 30]"),
    ("filter with a query", "df = df.query(\"Age > 30 and City == 'LA'\")"),
    ("sort rows", "df = df.sort_values('Name', ascending=False)"),
    ("remove duplicates", "df = df.drop_duplicates(subset=['Email'])"),
    ("first or last rows", "df = df.head(10)"),
    ("change types", "df['Age'] = pd.to_numeric(df['Age'], errors='coerce')"),
    ("parse dates", "df['Date'] = pd.to_datetime(df['Date'], errors='coerce')"),
    ("text cleanup", "df['Name'] = df['Name'].str.strip().str.title()"),
    ("text search", "df = df[df['Name'].str.contains('an')]"),
    ("replace values", "df['City'] = df['City'].replace({'NY': 'New York'})"),
    ("map values", "df['Flag'] = df['Flag'].map({'Y': 'yes', 'N': 'no'})"),
    ("derived columns", "df['Total'] = df['Price'] * df['Qty']"),
    ("conditional values", "df['Band'] = np.where(df['Age'] > 30, 'senior', 'junior')"),
    ("set values on matching rows", "df.loc[df['Age'] < 0, 'Age'] = None"),
    ("round numbers", "df = df.round(2)"),
    ("group and aggregate", "df = df.groupby('City', as_index=False)['Sales'].sum()"),
    ("reset the index", "df = df.reset_index(drop=True)"),
];

/// Rendered table of [`OPERATIONS`].
pub fn operations_description() -> String {
    let width = OPERATIONS.iter().map(|(op, _)| op.len()).max().unwrap_or(0);
    let mut out = String::from("Supported operations:\n\n");
    for (op, example) in OPERATIONS {
        out.push_str(&format!("  {:<width$}  {}\n", op, example, width = width));
    }
    out
}

/// System prompt shared by all providers.
pub fn system_prompt() -> String {
    let examples = OPERATIONS
        .iter()
        .map(|(op, example)| format!("- \"{}\" → {}", op, example))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a pandas code generator. Follow these rules strictly:

1. Generate ONLY executable pandas Python code
2. The dataframe is named 'df' - ALWAYS use reassignment pattern: df = df.operation()
3. Use only pandas operations and basic Python (no imports, no file operations)
4. If instruction is vague, respond EXACTLY: "Can you elaborate?"
5. If operation is impossible/dangerous, respond EXACTLY: "This operation is not possible"
6. Code must be safe (no file operations, eval, exec, loops, or complex logic)
7. Return only the code, no explanations or markdown formatting

CRITICAL PATTERN - Always reassign to df:
✓ CORRECT: df = df.drop(columns=['A'])
✗ WRONG: df.drop(columns=['A'])
✓ CORRECT: df = df.fillna(0)
✗ WRONG: df.fillna(0, inplace=True)

Examples:
- "remove null values" → df = df.dropna()
- "remove first 3 rows" → df = df.drop(index=[0, 1, 2])
{examples}"#,
        examples = examples
    )
}

/// User message for one instruction.
pub fn user_prompt(context: &str, instruction: &str) -> String {
    format!("Context:\n{}\n\nInstruction: {}", context, instruction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetsmith_editor::validate_snippet;

    #[test]
    fn test_prompt_contains_sentinels_and_examples() {
        let prompt = system_prompt();
        assert!(prompt.contains("Can you elaborate?"));
        assert!(prompt.contains("This operation is not possible"));
        assert!(prompt.contains("df = df.rename(columns={'A': 'B'})"));
    }

    #[test]
    fn test_every_example_passes_the_validator() {
        for (op, example) in OPERATIONS {
            assert!(validate_snippet(example), "{}: {}", op, example);
        }
    }

    #[test]
    fn test_user_prompt() {
        assert_eq!(
            user_prompt("a | b\n1 | 2", "drop b"),
            "Context:\na | b\n1 | 2\n\nInstruction: drop b"
        );
    }

    #[test]
    fn test_operations_description() {
        let text = operations_description();
        assert!(text.starts_with("Supported operations:"));
        assert_eq!(text.lines().count(), OPERATIONS.len() + 2);
    }
}
