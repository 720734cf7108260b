//! carenderia - terminal storefront for Kuya Vince Carenderia

mod output;

use std::io::{self, BufRead, IsTerminal};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use libcarenderia::config::{resolve_config_path, Config};
use libcarenderia::logging::LoggingConfig;
use libcarenderia::{
    Alert, CouponId, FoodId, ImageUpload, ProfileUpdate, Registration, ReviewDraft, Storefront,
    StorefrontError,
};
use secrecy::SecretString;
use tracing::{debug, warn};

use crate::output::{sync_label, Output, OutputFormat};

#[derive(Parser, Debug)]
#[command(name = "carenderia")]
#[command(version, about = "Browse the menu, review dishes and claim coupons at Kuya Vince Carenderia")]
#[command(long_about = r#"Browse the menu, review dishes and claim coupons at Kuya Vince Carenderia.

EXAMPLES:
    # What's cooking today
    carenderia menu
    carenderia menu --category Ulam
    carenderia show 3

    # Favorites are kept on this device only
    carenderia favorites add 3
    carenderia favorites list

    # Reviews (posting needs an account)
    carenderia reviews list --food 3
    carenderia reviews add --food 3 --rating 5 --comment "Sarap!" --image plate.jpg

    # Accounts and coupons
    carenderia login juan
    echo "$PASSWORD" | carenderia login juan --password-stdin
    carenderia coupons list
    carenderia coupons claim 7
    carenderia coupons redeem 7

    # JSON output for scripting
    carenderia --format json coupons wallet

EXIT CODES:
    0 - Success
    1 - Error (network, server, configuration, ...)
    2 - Not logged in, or the session expired
    3 - Invalid input
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(long, global = true, env = "CARENDERIA_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List menu items
    Menu {
        /// Only items in this category
        #[arg(short, long)]
        category: Option<String>,

        /// Case-insensitive match on name or description
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Show one dish with its reviews
    Show { id: FoodId },

    /// Manage favorite dishes
    #[command(subcommand)]
    Favorites(FavoritesCommand),

    /// Read and write reviews
    #[command(subcommand)]
    Reviews(ReviewsCommand),

    /// Log in
    Login {
        username: String,

        /// Read the password from stdin instead of prompting
        #[arg(long)]
        password_stdin: bool,
    },

    /// Log out and forget the session on this device
    Logout,

    /// Create an account
    Signup(SignupArgs),

    /// View or change your account
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Promotional coupons and your wallet
    #[command(subcommand)]
    Coupons(CouponsCommand),

    /// Reset a forgotten password with an emailed code
    #[command(subcommand)]
    PasswordReset(PasswordResetCommand),
}

#[derive(Subcommand, Debug)]
enum FavoritesCommand {
    List,
    Add { id: FoodId },
    Remove { id: FoodId },
}

#[derive(Subcommand, Debug)]
enum ReviewsCommand {
    /// Shop reviews, or a dish's reviews with --food
    List {
        #[arg(long)]
        food: Option<FoodId>,
    },

    /// Review the shop, or a dish with --food
    Add {
        #[arg(long)]
        food: Option<FoodId>,

        /// 1 to 5
        #[arg(short, long)]
        rating: u8,

        #[arg(short, long, default_value = "")]
        comment: String,

        /// Photo to attach (jpg, png, gif or webp)
        #[arg(long, value_name = "PATH")]
        image: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct SignupArgs {
    #[arg(long)]
    username: String,

    #[arg(long)]
    email: String,

    #[command(flatten)]
    details: ProfileArgs,

    /// Read the password from stdin instead of prompting
    #[arg(long)]
    password_stdin: bool,
}

#[derive(Args, Debug, Default)]
struct ProfileArgs {
    #[arg(long)]
    first_name: Option<String>,

    #[arg(long)]
    middle_name: Option<String>,

    #[arg(long)]
    last_name: Option<String>,

    #[arg(long)]
    phone: Option<String>,

    #[arg(long)]
    address: Option<String>,
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    Show,

    Update {
        #[arg(long)]
        email: Option<String>,

        #[command(flatten)]
        details: ProfileArgs,
    },

    /// Deactivate your account (asks for your password)
    Deactivate {
        #[arg(long)]
        password_stdin: bool,
    },
}

#[derive(Subcommand, Debug)]
enum CouponsCommand {
    /// All promotional coupons
    List,
    /// Coupons you have claimed
    Wallet,
    Claim { id: CouponId },
    /// Mark a wallet coupon as used at the counter
    Redeem { id: CouponId },
    /// Remove a coupon from your wallet
    Remove { id: CouponId },
    /// Reconcile your wallet with the server
    Sync,
}

#[derive(Subcommand, Debug)]
enum PasswordResetCommand {
    /// Email a one-time code
    Request { email: String },
    Verify { email: String, code: String },
    /// Set a new password using the code
    Change {
        email: String,
        code: String,

        #[arg(long)]
        password_stdin: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    if let Err(e) = run(cli).await {
        let (alert, code) = match e.downcast_ref::<StorefrontError>() {
            Some(err) => (Alert::from(err), err.exit_code()),
            None => (Alert::error(format!("{:#}", e)), 1),
        };
        eprintln!("{}", alert);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => resolve_config_path()?,
    };
    let config = Config::load_or_default(&config_path)?;
    debug!(config = %config_path.display(), base_url = %config.api.base_url, "Configuration loaded");

    let storefront = Storefront::from_config(config).await?;
    let out = Output::new(cli.format);

    if let Err(e) = dispatch(&storefront, &out, cli.command).await {
        // Lets an expired session log out before the alert is shown
        if let Some(err) = e.downcast_ref::<StorefrontError>() {
            storefront.handle_error(err).await;
        }
        return Err(e);
    }
    Ok(())
}

async fn dispatch(storefront: &Storefront, out: &Output, command: Commands) -> Result<()> {
    match command {
        Commands::Menu { category, search } => {
            let menu = storefront.menu();
            menu.refresh().await?;
            let mut items = match search {
                Some(term) => menu.search(&term).await,
                None => menu.items().await,
            };
            if let Some(category) = category {
                items.retain(|item| item.category.eq_ignore_ascii_case(&category));
            }
            out.menu(&items)
        }
        Commands::Show { id } => {
            let menu = storefront.menu();
            menu.refresh().await?;
            let item = menu.item(id).await.ok_or_else(|| no_such_dish(id))?;

            let reviews = storefront.reviews();
            reviews.refresh_reviews().await?;
            let average = reviews.average_food_rating(id).await;
            let favorite = storefront.favorites().is_favorite(id).await;
            out.dish(&item, average, favorite, &reviews.food_reviews(id).await)
        }
        Commands::Favorites(command) => favorites(storefront, out, command).await,
        Commands::Reviews(command) => reviews(storefront, out, command).await,
        Commands::Login {
            username,
            password_stdin,
        } => {
            let password = read_password("Password: ", password_stdin)?;
            let user = storefront.auth().sign_in(&username, &password).await?;
            out.message(&format!("Welcome, {}!", user.full_name()))
        }
        Commands::Logout => {
            storefront.auth().logout().await;
            out.message("Logged out")
        }
        Commands::Signup(args) => {
            let password = read_password("Choose a password: ", args.password_stdin)?;
            let registration = Registration {
                username: args.username,
                email: args.email,
                password,
                first_name: args.details.first_name,
                middle_name: args.details.middle_name,
                last_name: args.details.last_name,
                phone: args.details.phone,
                address: args.details.address,
            };
            let user = storefront.auth().sign_up(&registration).await?;
            out.message(&format!(
                "Account created for {}. You can now log in.",
                user.username
            ))
        }
        Commands::Profile(command) => profile(storefront, out, command).await,
        Commands::Coupons(command) => coupons(storefront, out, command).await,
        Commands::PasswordReset(command) => password_reset(storefront, out, command).await,
    }
}

async fn favorites(storefront: &Storefront, out: &Output, command: FavoritesCommand) -> Result<()> {
    let favorites = storefront.favorites();
    match command {
        FavoritesCommand::List => {
            // Names are a nicety; the list itself is local
            if let Err(e) = storefront.menu().refresh().await {
                warn!(error = %e, "Menu unavailable, listing favorite ids only");
            }
            let items = favorites
                .favorite_items(&storefront.menu().items().await)
                .await;
            out.favorites(&favorites.favorites().await, &items)
        }
        FavoritesCommand::Add { id } => {
            let menu = storefront.menu();
            menu.refresh().await?;
            let item = menu.item(id).await.ok_or_else(|| no_such_dish(id))?;
            if favorites.add_favorite(&item).await {
                out.message(&format!("Added {} to favorites", item.name))
            } else {
                out.message(&format!("{} is already a favorite", item.name))
            }
        }
        FavoritesCommand::Remove { id } => {
            if favorites.remove_favorite(id).await {
                out.message("Removed from favorites")
            } else {
                Err(StorefrontError::InvalidInput(format!("Item {} is not a favorite", id)).into())
            }
        }
    }
}

async fn reviews(storefront: &Storefront, out: &Output, command: ReviewsCommand) -> Result<()> {
    let reviews = storefront.reviews();
    match command {
        ReviewsCommand::List { food } => {
            reviews.refresh_reviews().await?;
            match food {
                Some(id) => out.reviews(
                    &reviews.food_reviews(id).await,
                    reviews.average_food_rating(id).await,
                ),
                None => out.reviews(
                    &reviews.shop_reviews().await,
                    reviews.average_shop_rating().await,
                ),
            }
        }
        ReviewsCommand::Add {
            food,
            rating,
            comment,
            image,
        } => {
            let mut draft = ReviewDraft::new(rating, comment);
            draft.validate()?;
            if let Some(path) = image {
                draft = draft.with_image(ImageUpload::from_path(&path)?);
            }

            let created = match food {
                Some(id) => reviews.add_food_review(id, draft).await?,
                None => reviews.add_shop_review(draft).await?,
            };
            out.review_created(&created)
        }
    }
}

async fn profile(storefront: &Storefront, out: &Output, command: ProfileCommand) -> Result<()> {
    let auth = storefront.auth();
    match command {
        ProfileCommand::Show => {
            let user = match auth.refresh_profile().await {
                Ok(user) => user,
                Err(e) => {
                    debug!(error = %e, "Profile refresh failed, trying cached profile");
                    auth.user().await.ok_or(e)?
                }
            };
            out.profile(&user)
        }
        ProfileCommand::Update { email, details } => {
            let update = ProfileUpdate {
                email,
                first_name: details.first_name,
                middle_name: details.middle_name,
                last_name: details.last_name,
                phone: details.phone,
                address: details.address,
            };
            let user = auth.update_profile(&update).await?;
            out.profile(&user)
        }
        ProfileCommand::Deactivate { password_stdin } => {
            let password = read_password("Password: ", password_stdin)?;
            auth.deactivate_account(&password).await?;
            out.message("Your account has been deactivated")
        }
    }
}

async fn coupons(storefront: &Storefront, out: &Output, command: CouponsCommand) -> Result<()> {
    let auth = storefront.auth();
    match command {
        CouponsCommand::List => out.coupons(&auth.available_coupons().await?),
        CouponsCommand::Wallet => {
            match auth.refresh_wallet().await {
                Ok(_) => {}
                Err(e) if e.is_session_expired() || matches!(e, StorefrontError::LoginRequired(_)) => {
                    return Err(e.into())
                }
                Err(e) => warn!(error = %e, "Showing wallet without refreshing"),
            }
            out.wallet(&auth.wallet_entries().await, auth.wallet_sync_state().await)
        }
        CouponsCommand::Claim { id } => {
            let coupon = auth
                .available_coupons()
                .await?
                .into_iter()
                .find(|c| c.id == id)
                .ok_or_else(|| StorefrontError::InvalidInput(format!("No coupon with id {}", id)))?;

            if auth.claim_coupon(&coupon).await? {
                out.message(&format!("Claimed {}. It's in your wallet.", coupon.name))
            } else {
                out.message(&format!("{} is already in your wallet", coupon.name))
            }
        }
        CouponsCommand::Redeem { id } => {
            if !auth.mark_redeemed(id).await? {
                return Err(not_in_wallet(id).into());
            }
            let code = auth
                .claimed_coupons()
                .await
                .into_iter()
                .find(|c| c.id == id)
                .map(|c| c.code)
                .unwrap_or_default();
            out.message(&format!("Redeemed. Show code {} at the counter.", code))
        }
        CouponsCommand::Remove { id } => {
            if !auth.remove_from_wallet(id).await {
                return Err(not_in_wallet(id).into());
            }
            out.message("Removed from your wallet")
        }
        CouponsCommand::Sync => {
            let state = auth.refresh_wallet().await?;
            out.message(&format!("Wallet {}", sync_label(state)))
        }
    }
}

async fn password_reset(
    storefront: &Storefront,
    out: &Output,
    command: PasswordResetCommand,
) -> Result<()> {
    let auth = storefront.auth();
    match command {
        PasswordResetCommand::Request { email } => {
            auth.request_password_reset(&email).await?;
            out.message(&format!("A one-time code was sent to {}", email.trim()))
        }
        PasswordResetCommand::Verify { email, code } => {
            auth.verify_reset_code(&email, &code).await?;
            out.message("Code verified")
        }
        PasswordResetCommand::Change {
            email,
            code,
            password_stdin,
        } => {
            let password = read_password("New password: ", password_stdin)?;
            auth.reset_password(&email, &code, &password).await?;
            out.message("Password changed. You can now log in.")
        }
    }
}

fn read_password(prompt: &str, from_stdin: bool) -> Result<SecretString> {
    let password = if from_stdin {
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read password from stdin")?;
        line.trim_end_matches(['\r', '\n']).to_string()
    } else {
        if !io::stdin().is_terminal() {
            anyhow::bail!("Not a TTY. Use --password-stdin to read the password from stdin.");
        }
        rpassword::prompt_password(prompt)?
    };
    Ok(SecretString::from(password))
}

fn no_such_dish(id: FoodId) -> StorefrontError {
    StorefrontError::InvalidInput(format!("No menu item with id {}", id))
}

fn not_in_wallet(id: CouponId) -> StorefrontError {
    StorefrontError::InvalidInput(format!("Coupon {} is not in your wallet", id))
}
