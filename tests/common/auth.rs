use super::app::TestApp;

pub fn auth_header(token: &str) -> String {
    format!("Bearer {token}")
}

pub fn admin_headers(app: &TestApp) -> Vec<(&'static str, String)> {
    vec![("authorization", auth_header(&app.config.admin_token))]
}
