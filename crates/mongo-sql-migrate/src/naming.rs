//! Naming conventions for derived tables, columns and type names.
//!
//! Relational names are derived from model and attribute names the way the
//! source CMS derives them: snake_case tables, `<singular>_id` foreign keys,
//! and PascalCase global type names. Inflection uses the same rule set as the
//! CMS (`pluralize`), so derived names match the existing target schema.

use convert_case::{Case, Casing};
use pluralizer::pluralize;

/// Plural form of `word`. Already-plural words are unchanged.
pub fn plural(word: &str) -> String {
    pluralize(word, 2, false)
}

/// Singular form of `word`. Already-singular words are unchanged.
pub fn singular(word: &str) -> String {
    pluralize(word, 1, false)
}

/// Replace separators the case converter does not know with spaces.
fn words(input: &str) -> String {
    input
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect()
}

/// `snake_case` of an arbitrary identifier (`friendOf` -> `friend_of`).
pub fn snake_case(input: &str) -> String {
    words(input).to_case(Case::Snake)
}

/// `PascalCase` of an arbitrary identifier (`users-permissions-user` -> `UsersPermissionsUser`).
pub fn pascal_case(input: &str) -> String {
    words(input).to_case(Case::Pascal)
}

/// Foreign-key column naming a table's rows: `<singular table>_id`.
pub fn foreign_key(table: &str) -> String {
    format!("{}_id", singular(table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plural_forms() {
        assert_eq!(plural("tag"), "tags");
        assert_eq!(plural("category"), "categories");
        assert_eq!(plural("address"), "addresses");
        assert_eq!(plural("box"), "boxes");
        assert_eq!(plural("hero"), "heroes");
        assert_eq!(plural("photo"), "photos");
        assert_eq!(plural("status"), "statuses");
        assert_eq!(plural("knife"), "knives");
        assert_eq!(plural("day"), "days");
        assert_eq!(plural("quiz"), "quizzes");
        assert_eq!(plural("analysis"), "analyses");
    }

    #[test]
    fn test_plural_keeps_plurals() {
        assert_eq!(plural("posts"), "posts");
        assert_eq!(plural("people"), "people");
        assert_eq!(plural("news"), "news");
    }

    #[test]
    fn test_singular_forms() {
        assert_eq!(singular("articles"), "article");
        assert_eq!(singular("categories"), "category");
        assert_eq!(singular("addresses"), "address");
        assert_eq!(singular("heroes"), "hero");
        assert_eq!(singular("statuses"), "status");
        assert_eq!(singular("status"), "status");
        assert_eq!(singular("people"), "person");
        assert_eq!(singular("user"), "user");
        assert_eq!(singular("houses"), "house");
        assert_eq!(singular("responses"), "response");
        assert_eq!(singular("quizzes"), "quiz");
        assert_eq!(singular("analyses"), "analysis");
    }

    #[test]
    fn test_inflection_of_compound_names() {
        assert_eq!(singular("upload_files"), "upload_file");
        assert_eq!(singular("users-permissions_user"), "users-permissions_user");
        assert_eq!(plural("components_default_hero"), "components_default_heroes");
    }

    #[test]
    fn test_case_conversion() {
        assert_eq!(snake_case("friendOf"), "friend_of");
        assert_eq!(snake_case("posts_tags"), "posts_tags");
        assert_eq!(pascal_case("users-permissions-user"), "UsersPermissionsUser");
        assert_eq!(pascal_case("component_default.hero"), "ComponentDefaultHero");
    }

    #[test]
    fn test_foreign_key() {
        assert_eq!(foreign_key("articles"), "article_id");
        assert_eq!(foreign_key("upload_file"), "upload_file_id");
        assert_eq!(foreign_key("quizzes"), "quiz_id");
        assert_eq!(foreign_key("analyses"), "analysis_id");
        assert_eq!(foreign_key("categories"), "category_id");
    }
}
