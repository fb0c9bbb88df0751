pub mod normalizer;
pub mod recipe;

pub use normalizer::{is_stop_word, normalize, STOP_WORDS};
pub use recipe::{
    parse_ingredient_list, read_recipes, NormalizedRecipe, RawRecipe, RecipeBatch,
    RecipeSourceError,
};
