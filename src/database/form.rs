use std::collections::HashSet;

use serde::Deserialize;

use super::error::Error;
use super::schema::Uuid;
use crate::constants::{
    EMAIL_MAX_LEN, NAME_MAX_LEN, PASSWORD_MIN_LEN, RECIPE_NAME_MAX_LEN, USERNAME_MAX_LEN,
};

/// Inbound payloads are explicit typed forms. Every form validates itself
/// before any action touches the store; a form that fails validation never
/// reaches a query.

#[derive(Deserialize, Debug, Clone)]
pub struct RecipeIngredientForm {
    pub id: Uuid,
    pub amount: i32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RecipeForm {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    #[serde(default)]
    pub tags: Option<Vec<Uuid>>,
    #[serde(default)]
    pub ingredients: Option<Vec<RecipeIngredientForm>>,
    #[serde(default)]
    pub image: Option<String>,
}

impl RecipeForm {
    /// Full payload check. Both `tags` and `ingredients` are mandatory on
    /// create and update alike: an update always replaces the full
    /// association sets, it never merges with what is stored.
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("Field 'name' must not be empty"));
        }
        if self.name.chars().count() > RECIPE_NAME_MAX_LEN {
            return Err(Error::validation("Field 'name' is too long"));
        }
        if self.text.trim().is_empty() {
            return Err(Error::validation("Field 'text' must not be empty"));
        }
        if self.cooking_time < 1 {
            return Err(Error::validation("Field 'cooking_time' must be at least 1"));
        }

        let tags = self
            .tags
            .as_deref()
            .ok_or_else(|| Error::validation("Field 'tags' is required"))?;
        if tags.is_empty() {
            return Err(Error::validation("At least one tag is required"));
        }

        let ingredients = self
            .ingredients
            .as_deref()
            .ok_or_else(|| Error::validation("Field 'ingredients' is required"))?;
        if ingredients.is_empty() {
            return Err(Error::validation("At least one ingredient is required"));
        }

        let mut seen: HashSet<Uuid> = HashSet::new();
        for entry in ingredients {
            if entry.amount < 1 {
                return Err(Error::validation(format!(
                    "Ingredient {} amount must be at least 1",
                    entry.id
                )));
            }
            if !seen.insert(entry.id) {
                return Err(Error::validation(format!(
                    "Ingredient {} appears more than once",
                    entry.id
                )));
            }
        }

        Ok(())
    }

    pub fn tag_ids(&self) -> &[Uuid] {
        self.tags.as_deref().unwrap_or(&[])
    }

    pub fn ingredient_entries(&self) -> &[RecipeIngredientForm] {
        self.ingredients.as_deref().unwrap_or(&[])
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct RegisterForm {
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub password: String,
}

fn valid_username_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-')
}

impl RegisterForm {
    pub fn validate(&self) -> Result<(), Error> {
        if self.email.trim().is_empty() || !self.email.contains('@') {
            return Err(Error::validation("Enter a valid email address"));
        }
        if self.email.chars().count() > EMAIL_MAX_LEN {
            return Err(Error::validation("Field 'email' is too long"));
        }
        if self.username.is_empty() || !self.username.chars().all(valid_username_char) {
            return Err(Error::validation("Enter a valid username"));
        }
        if self.username.chars().count() > USERNAME_MAX_LEN {
            return Err(Error::validation("Field 'username' is too long"));
        }
        if self.first_name.chars().count() > NAME_MAX_LEN
            || self.last_name.chars().count() > NAME_MAX_LEN
        {
            return Err(Error::validation("Name fields are limited to 150 characters"));
        }
        if self.password.chars().count() < PASSWORD_MIN_LEN {
            return Err(Error::validation(
                "Password must be at least 8 characters long",
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PasswordForm {
    pub current_password: String,
    pub new_password: String,
}

impl PasswordForm {
    pub fn validate(&self) -> Result<(), Error> {
        if self.new_password.chars().count() < PASSWORD_MIN_LEN {
            return Err(Error::validation(
                "Password must be at least 8 characters long",
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct AvatarForm {
    pub avatar: Option<String>,
}

/// Name-prefix filter for ingredient lookup.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct IngredientQuery {
    #[serde(default)]
    pub name: Option<String>,
}

/// The recipe list filter set. The two viewer-dependent flags are ignored
/// for anonymous viewers.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RecipeQuery {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub author: Option<Uuid>,
    #[serde(default)]
    pub is_favorited: Option<bool>,
    #[serde(default)]
    pub is_in_shopping_cart: Option<bool>,
    #[serde(default)]
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe_form() -> RecipeForm {
        RecipeForm {
            name: String::from("Pancakes"),
            text: String::from("Mix and fry."),
            cooking_time: 20,
            tags: Some(vec![1, 2]),
            ingredients: Some(vec![
                RecipeIngredientForm { id: 1, amount: 200 },
                RecipeIngredientForm { id: 2, amount: 2 },
            ]),
            image: None,
        }
    }

    #[test]
    fn complete_recipe_payload_passes() {
        assert!(recipe_form().validate().is_ok());
    }

    #[test]
    fn zero_cooking_time_is_rejected() {
        let mut form = recipe_form();
        form.cooking_time = 0;
        let err = form.validate().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn blank_name_and_text_are_rejected() {
        let mut form = recipe_form();
        form.name = String::from("   ");
        assert!(form.validate().is_err());

        let mut form = recipe_form();
        form.text = String::new();
        assert!(form.validate().is_err());
    }

    #[test]
    fn omitted_tags_or_ingredients_are_rejected() {
        let mut form = recipe_form();
        form.tags = None;
        assert!(matches!(form.validate(), Err(Error::Validation(_))));

        let mut form = recipe_form();
        form.ingredients = None;
        assert!(matches!(form.validate(), Err(Error::Validation(_))));

        let mut form = recipe_form();
        form.tags = Some(vec![]);
        assert!(form.validate().is_err());

        let mut form = recipe_form();
        form.ingredients = Some(vec![]);
        assert!(form.validate().is_err());
    }

    #[test]
    fn duplicate_ingredient_in_payload_is_rejected() {
        let mut form = recipe_form();
        form.ingredients = Some(vec![
            RecipeIngredientForm { id: 7, amount: 1 },
            RecipeIngredientForm { id: 7, amount: 3 },
        ]);
        let err = form.validate().unwrap_err();
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let mut form = recipe_form();
        form.ingredients = Some(vec![RecipeIngredientForm { id: 1, amount: 0 }]);
        assert!(form.validate().is_err());
    }

    #[test]
    fn register_form_checks_shape() {
        let form = RegisterForm {
            email: String::from("cook@example.com"),
            username: String::from("chef.anna_77"),
            first_name: String::from("Anna"),
            last_name: String::from("Lee"),
            password: String::from("longenough"),
        };
        assert!(form.validate().is_ok());

        let mut bad = form.clone();
        bad.email = String::from("not-an-email");
        assert!(bad.validate().is_err());

        let mut bad = form.clone();
        bad.username = String::from("spaced name");
        assert!(bad.validate().is_err());

        let mut bad = form;
        bad.password = String::from("short");
        assert!(bad.validate().is_err());
    }
}
