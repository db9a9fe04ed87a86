mod crud_steps;
mod schema_steps;
