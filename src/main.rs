use clap::{Arg, ArgAction, ArgMatches, Command};
use std::error::Error;
use std::io::{self, Write};
use std::path::Path;
use std::process;
use std::sync::Arc;

use account_tokens::auth::password::read_password;
use account_tokens::auth::uid::encode_uid;
use account_tokens::config::settings::users_file;
use account_tokens::email::{RetryingMailer, SmtpMailer};
use account_tokens::security::{generate_secret_key, SecretKeyStore};
use account_tokens::tokens::{Clock, SystemClock};
use account_tokens::utils::io::prompt;
use account_tokens::utils::logging::initialize_logging;
use account_tokens::utils::time::format_timestamp;
use account_tokens::{
    AccountService, FlowError, JsonUserStore, Registration, Settings, TokenEngine, UserStore,
    VerifyOutcome,
};

type CliResult = Result<(), Box<dyn Error>>;

fn cli() -> Command {
    let purpose = Arg::new("purpose")
        .help("Which token family to use")
        .long("purpose")
        .value_parser(["verify", "reset"])
        .default_value("verify");

    Command::new("account-tokens")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Email verification and password reset tokens")
        .arg(
            Arg::new("log-file")
                .help("Append logs to this file instead of stderr")
                .long("log-file")
                .global(true),
        )
        .subcommand(
            Command::new("generate-secret")
                .about("Generate a new signing secret")
                .arg(
                    Arg::new("store")
                        .help("Save the secret in the system keyring")
                        .long("store")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("register")
                .about("Create an account and send the verification email")
                .arg(Arg::new("email").required(true))
                .arg(Arg::new("first-name").long("first-name").default_value(""))
                .arg(Arg::new("last-name").long("last-name").default_value("")),
        )
        .subcommand(
            Command::new("resend-verification")
                .about("Send a fresh verification email")
                .arg(Arg::new("email").required(true)),
        )
        .subcommand(
            Command::new("verify-email")
                .about("Consume a verification link")
                .arg(Arg::new("uid").required(true))
                .arg(Arg::new("token").required(true)),
        )
        .subcommand(
            Command::new("request-reset")
                .about("Email a password reset link")
                .arg(Arg::new("email").required(true)),
        )
        .subcommand(
            Command::new("confirm-reset")
                .about("Set a new password using a reset link")
                .arg(Arg::new("uid").required(true))
                .arg(Arg::new("token").required(true)),
        )
        .subcommand(
            Command::new("login")
                .about("Check credentials and record the login")
                .arg(Arg::new("email").required(true)),
        )
        .subcommand(
            Command::new("make-token")
                .about("Print a token and link for an account")
                .arg(Arg::new("email").required(true))
                .arg(purpose.clone()),
        )
        .subcommand(
            Command::new("check-token")
                .about("Check a token against an account")
                .arg(Arg::new("email").required(true))
                .arg(Arg::new("token").required(true))
                .arg(purpose),
        )
        .subcommand(Command::new("list-users").about("List registered accounts"))
}

struct App {
    settings: Settings,
    store: Arc<JsonUserStore>,
    clock: Arc<SystemClock>,
    service: AccountService,
}

impl App {
    fn load() -> Result<Self, Box<dyn Error>> {
        let settings = Settings::from_env()?;
        let store = Arc::new(JsonUserStore::open(&settings.users_file)?);
        let clock = Arc::new(SystemClock);
        let mailer = RetryingMailer::new(SmtpMailer::new(settings.smtp_settings())?);

        let service = AccountService::new(
            store.clone(),
            Arc::new(mailer),
            clock.clone(),
            settings.verification_engine(),
            settings.password_reset_engine(),
            settings.mail_context(),
        );

        Ok(Self {
            settings,
            store,
            clock,
            service,
        })
    }

    fn engine(&self, purpose: &str) -> &TokenEngine {
        match purpose {
            "reset" => self.service.password_reset_engine(),
            _ => self.service.verification_engine(),
        }
    }

    fn dispatch(&self, matches: &ArgMatches) -> CliResult {
        match matches.subcommand() {
            Some(("register", sub)) => {
                let email = required(sub, "email");
                let password = ask_password("Password")?;
                let confirmation = ask_password("Confirm password")?;

                let user = self.service.register(Registration {
                    email: email.to_string(),
                    password,
                    password_confirmation: confirmation,
                    first_name: required(sub, "first-name").to_string(),
                    last_name: required(sub, "last-name").to_string(),
                })?;
                println!("Account created: {} ({})", user.email, user.id);
                println!("A verification email has been sent.");
            }
            Some(("resend-verification", sub)) => {
                self.service.resend_verification(required(sub, "email"))?;
                println!("Verification email sent.");
            }
            Some(("verify-email", sub)) => {
                match self
                    .service
                    .verify_email(required(sub, "uid"), required(sub, "token"))?
                {
                    VerifyOutcome::Verified => println!("Email verified successfully."),
                    VerifyOutcome::AlreadyVerified => println!("Email already verified."),
                }
            }
            Some(("request-reset", sub)) => {
                self.service.request_password_reset(required(sub, "email"))?;
                println!("If an account exists with this email, a reset link has been sent.");
            }
            Some(("confirm-reset", sub)) => {
                let (uid, token) = (required(sub, "uid"), required(sub, "token"));
                if !self.service.check_reset_token(uid, token)? {
                    return Err(FlowError::InvalidToken.into());
                }
                let password = ask_password("New password")?;
                let confirmation = ask_password("Confirm new password")?;

                self.service
                    .confirm_password_reset(uid, token, &password, &confirmation)?;
                println!("Password has been reset successfully.");
            }
            Some(("login", sub)) => {
                let email = required(sub, "email");
                let password = ask_password("Password")?;
                let user = self.service.login(email, &password)?;
                println!("Welcome back, {}.", user.email);
            }
            Some(("make-token", sub)) => {
                let user = self.find(required(sub, "email"))?;
                let purpose = required(sub, "purpose");
                let token = self.engine(purpose).make_token(&user, self.clock.now());
                let uid = encode_uid(&user.id);
                let ctx = self.settings.mail_context();
                let link = match purpose {
                    "reset" => ctx.reset_url(&uid, &token),
                    _ => ctx.verification_url(&uid, &token),
                };
                println!("uid:   {}\ntoken: {}\nlink:  {}", uid, token, link);
            }
            Some(("check-token", sub)) => {
                let user = self.find(required(sub, "email"))?;
                let engine = self.engine(required(sub, "purpose"));
                match engine.inspect_token(Some(&user), required(sub, "token"), self.clock.now()) {
                    Ok(()) => println!("Token is valid."),
                    Err(reason) => return Err(format!("token rejected: {:?}", reason).into()),
                }
            }
            _ => {
                cli().print_help()?;
            }
        }
        Ok(())
    }

    fn find(&self, email: &str) -> Result<account_tokens::User, Box<dyn Error>> {
        self.store
            .find_by_email(email)?
            .ok_or_else(|| FlowError::UnknownAccount.into())
    }
}

fn ask_password(label: &str) -> io::Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    read_password()
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> &'a str {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .unwrap_or_default()
}

fn list_users(store: &dyn UserStore) -> CliResult {
    let users = store.list()?;
    if users.is_empty() {
        println!("No users registered.");
    }
    for user in users {
        let last_login = user
            .last_login
            .map(|t| format_timestamp(t.timestamp()))
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{}\n  id: {}\n  active: {}  verified: {}\n  last login: {}\n",
            user.email, user.id, user.is_active, user.is_verified, last_login
        );
    }
    Ok(())
}

/// Subcommands that sign or check tokens, or send mail
fn requires_secret(command: &str) -> bool {
    !matches!(command, "generate-secret" | "list-users")
}

fn generate_secret(store: bool) -> CliResult {
    if !store {
        println!("{}", generate_secret_key());
        return Ok(());
    }
    let keyring = SecretKeyStore::new()?;
    let existing = keyring.get().is_ok();
    keyring.initialize_if_needed()?;
    if existing {
        println!("A signing secret is already stored in the system keyring.");
    } else {
        println!("New signing secret stored in the system keyring.");
    }
    Ok(())
}

fn run() -> CliResult {
    dotenvy::dotenv().ok();
    let matches = cli().get_matches();

    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_file = matches.get_one::<String>("log-file").map(Path::new);
    initialize_logging(&level, log_file)?;

    let command = match matches.subcommand() {
        Some(("generate-secret", sub)) => return generate_secret(sub.get_flag("store")),
        Some(("list-users", _)) => return list_users(&JsonUserStore::open(users_file())?),
        Some((command, _)) => command,
        None => {
            cli().print_help()?;
            return Ok(());
        }
    };

    // Offer to create a secret only when none exists anywhere. Keyring
    // failures other than a missing entry surface from `App::load`.
    if requires_secret(command) && std::env::var("SECRET_KEY").is_err() {
        let missing = match SecretKeyStore::new() {
            Ok(keyring) => matches!(keyring.get(), Err(e) if e.kind() == io::ErrorKind::NotFound),
            Err(_) => false,
        };
        if missing {
            let answer = prompt("No signing secret found. Generate and store one now? [y/N]")?;
            if answer.eq_ignore_ascii_case("y") {
                generate_secret(true)?;
            }
        }
    }

    App::load()?.dispatch(&matches)
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn test_only_token_commands_need_a_secret() {
        assert!(!requires_secret("list-users"));
        assert!(!requires_secret("generate-secret"));
        for command in [
            "register",
            "resend-verification",
            "verify-email",
            "request-reset",
            "confirm-reset",
            "login",
            "make-token",
            "check-token",
        ] {
            assert!(requires_secret(command), "{command}");
        }
    }

    #[test]
    fn test_list_users_reads_store_without_settings() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = JsonUserStore::open(dir.path().join("users.json")).unwrap();
        assert!(list_users(&store).is_ok());
    }
}
