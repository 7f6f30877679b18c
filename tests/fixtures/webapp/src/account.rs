pub struct Account;

pub struct User {
    pub email: String,
}

impl Account {
    pub fn audit(&self, user: &User) {
        info!("login {}", user.email);
    }
}
