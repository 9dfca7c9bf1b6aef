//! BIP-39/44 account key derivation, BRC-42 ECDH child keys and BRC-43
//! tagged keys (C1).
//!
//! Grounded in `ln-dlc-node`'s `seed.rs` (mnemonic handling via `bip39`,
//! key material derived with `hkdf`/`sha2`) and `cipher.rs` (secp256k1
//! usage style).

mod invoice_numbers;

pub use invoice_numbers::generate_invoice_numbers;

use anyhow::{Context, Result};
use bitcoin::bip32::{ChildNumber, DerivationPath, ExtendedPrivKey, ExtendedPubKey};
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey, SECP256K1};
use bitcoin::{Address, Network, PublicKey as BtcPublicKey};
use hkdf::Hkdf;
use sha2::Sha256;

/// Coin type used for every derivation path in this wallet (mirrors the
/// fixed `236'` coin type spec.md §4.1 hard-codes).
const COIN_TYPE: u32 = 236;

/// A BIP-39 mnemonic plus the seed bytes derived from it.
#[derive(Clone)]
pub struct Mnemonic {
    inner: bip39::Mnemonic,
}

impl Mnemonic {
    pub fn generate() -> Result<Self> {
        let mut rng = bitcoin::secp256k1::rand::thread_rng();
        let inner = bip39::Mnemonic::generate_in_with(&mut rng, bip39::Language::English, 12)?;
        Ok(Self { inner })
    }

    pub fn parse(phrase: &str) -> Result<Self> {
        let inner = bip39::Mnemonic::parse_in(bip39::Language::English, phrase)
            .context("invalid mnemonic phrase")?;
        Ok(Self { inner })
    }

    pub fn words(&self) -> Vec<String> {
        self.inner.word_iter().map(|w| w.to_owned()).collect()
    }

    fn seed(&self) -> [u8; 64] {
        self.inner.to_seed_normalized("")
    }

    fn master_xprv(&self, network: Network) -> Result<ExtendedPrivKey> {
        // Derive a dedicated wallet-root seed from the BIP-39 seed via HKDF,
        // the same separation `ln-dlc-node`'s `Bip39Seed::wallet_seed` uses
        // to keep different subsystems' key material independent.
        let mut wallet_seed = [0u8; 64];
        Hkdf::<Sha256>::new(None, &self.seed())
            .expand(b"SIMPLYSATS_WALLET_SEED", &mut wallet_seed)
            .expect("array is of correct length");

        ExtendedPrivKey::new_master(network, &wallet_seed)
            .context("failed to derive master extended private key")
    }
}

/// The three keys derived for a single BIP-44 account index.
pub struct AccountKeys {
    pub wallet_key: SecretKey,
    pub ordinal_key: SecretKey,
    pub identity_key: SecretKey,
}

/// `m/44'/236'/accountIndex'/1/0`, `m/44'/236'/accountIndex'/2/0`, and the
/// account-independent identity root `m/0'/236'/0'/0/0`.
pub fn derive_account(
    mnemonic: &Mnemonic,
    network: Network,
    account_index: u32,
) -> Result<AccountKeys> {
    let secp = SECP256K1;
    let master = mnemonic.master_xprv(network)?;

    let wallet_key = derive_path(secp, &master, &wallet_path(account_index))?;
    let ordinal_key = derive_path(secp, &master, &ordinal_path(account_index))?;
    let identity_key = derive_path(secp, &master, &identity_path())?;

    Ok(AccountKeys {
        wallet_key: wallet_key.private_key,
        ordinal_key: ordinal_key.private_key,
        identity_key: identity_key.private_key,
    })
}

fn wallet_path(account_index: u32) -> DerivationPath {
    path(&[hardened(44), hardened(COIN_TYPE), hardened(account_index), normal(1), normal(0)])
}

fn ordinal_path(account_index: u32) -> DerivationPath {
    path(&[hardened(44), hardened(COIN_TYPE), hardened(account_index), normal(2), normal(0)])
}

fn identity_path() -> DerivationPath {
    path(&[hardened(0), hardened(COIN_TYPE), hardened(0), normal(0), normal(0)])
}

fn hardened(index: u32) -> ChildNumber {
    ChildNumber::from_hardened_idx(index).expect("index fits in 31 bits")
}

fn normal(index: u32) -> ChildNumber {
    ChildNumber::from_normal_idx(index).expect("index fits in 31 bits")
}

fn path(components: &[ChildNumber]) -> DerivationPath {
    DerivationPath::from(components.to_vec())
}

fn derive_path(
    secp: &Secp256k1<bitcoin::secp256k1::All>,
    master: &ExtendedPrivKey,
    path: &DerivationPath,
) -> Result<ExtendedPrivKey> {
    master
        .derive_priv(secp, path)
        .context("BIP-32 child derivation failed")
}

/// BRC-42: `childPriv = receiverPriv + HMAC-SHA256(ECDH(receiverPriv,
/// senderPub), invoiceNumber) mod n`.
pub fn derive_child_private_key(
    receiver_priv: &SecretKey,
    sender_pub: &PublicKey,
    invoice_number: &str,
) -> Result<SecretKey> {
    let tweak = invoice_tweak(receiver_priv, sender_pub, invoice_number)?;
    receiver_priv
        .add_tweak(&tweak)
        .context("BRC-42 tweak addition overflowed the curve order")
}

/// The receiving side's public counterpart: `childPub = receiverPub +
/// tweak*G`. Lets a sender compute a one-time receive address without ever
/// seeing the receiver's private key.
pub fn derive_child_public_key(
    receiver_pub: &PublicKey,
    sender_priv: &SecretKey,
    invoice_number: &str,
) -> Result<PublicKey> {
    let sender_pub = PublicKey::from_secret_key(SECP256K1, sender_priv);
    let shared_point = ecdh_shared_secret(sender_priv, receiver_pub)?;
    let tweak = hmac_tweak(&shared_point, invoice_number)?;
    let _ = sender_pub; // kept for symmetry/documentation; ECDH is symmetric
    receiver_pub
        .add_exp_tweak(SECP256K1, &tweak.into())
        .context("BRC-42 tweak addition overflowed the curve order")
}

fn invoice_tweak(
    receiver_priv: &SecretKey,
    sender_pub: &PublicKey,
    invoice_number: &str,
) -> Result<bitcoin::secp256k1::Scalar> {
    let shared_point = ecdh_shared_secret(receiver_priv, sender_pub)?;
    hmac_tweak(&shared_point, invoice_number)
}

fn ecdh_shared_secret(priv_key: &SecretKey, pub_key: &PublicKey) -> Result<[u8; 33]> {
    let mut point = *pub_key;
    point = point
        .mul_tweak(SECP256K1, &bitcoin::secp256k1::Scalar::from(*priv_key))
        .context("ECDH scalar multiplication failed")?;
    Ok(point.serialize())
}

fn hmac_tweak(shared_point: &[u8; 33], invoice_number: &str) -> Result<bitcoin::secp256k1::Scalar> {
    use hmac::{Hmac, Mac};
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(shared_point).expect("HMAC accepts any key length");
    mac.update(invoice_number.as_bytes());
    let digest = mac.finalize().into_bytes();

    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    bitcoin::secp256k1::Scalar::from_be_bytes(bytes).context("invoice tweak is not a valid scalar")
}

/// A BRC-43-tagged key: `{label, id, domain?}` → a key deterministic in the
/// tag, derived via the same ECDH construction as BRC-42 but using the
/// root's own public key as the (self) counterparty.
pub struct TaggedKey {
    pub private_key: SecretKey,
    pub public_key: PublicKey,
    pub address: Address,
    pub path: String,
}

/// Tags that bypass derivation entirely and hand back the wallet's
/// principal keys, per spec.md §4.1.
const KNOWN_TAGGED_KEYS: &[(&str, &str)] = &[("yours", "identity")];

pub fn derive_tagged_key(
    root: &SecretKey,
    label: &str,
    id: &str,
    domain: Option<&str>,
    network: Network,
) -> Result<TaggedKey> {
    if KNOWN_TAGGED_KEYS.iter().any(|(l, i)| *l == label && *i == id) {
        let public_key = PublicKey::from_secret_key(SECP256K1, root);
        let address = p2pkh_address(&public_key, network);
        return Ok(TaggedKey {
            private_key: *root,
            public_key,
            address,
            path: format!("known:{label}/{id}"),
        });
    }

    let invoice_number = match domain {
        Some(domain) => format!("{label}-{domain} {id}"),
        None => format!("{label} {id}"),
    };

    let root_pub = PublicKey::from_secret_key(SECP256K1, root);
    let private_key = derive_child_private_key(root, &root_pub, &invoice_number)?;
    let public_key = PublicKey::from_secret_key(SECP256K1, &private_key);
    let address = p2pkh_address(&public_key, network);

    Ok(TaggedKey {
        private_key,
        public_key,
        address,
        path: format!("brc43:{invoice_number}"),
    })
}

pub fn p2pkh_address(public_key: &PublicKey, network: Network) -> Address {
    let compressed = BtcPublicKey {
        compressed: true,
        inner: *public_key,
    };
    Address::p2pkh(&compressed, network)
}

/// `hash160(pubkey)`, used to build and match timelock locking scripts.
pub fn public_key_to_hash(public_key: &PublicKey) -> [u8; 20] {
    use bitcoin::hashes::{hash160, Hash};
    let compressed = BtcPublicKey {
        compressed: true,
        inner: *public_key,
    };
    hash160::Hash::hash(&compressed.to_bytes()).to_byte_array()
}

pub fn extended_pub_for_path(
    mnemonic: &Mnemonic,
    network: Network,
    account_index: u32,
    keychain: u32,
) -> Result<ExtendedPubKey> {
    let secp = SECP256K1;
    let master = mnemonic.master_xprv(network)?;
    let account_path = path(&[
        hardened(44),
        hardened(COIN_TYPE),
        hardened(account_index),
        normal(keychain),
        normal(0),
    ]);
    let xprv = derive_path(secp, &master, &account_path)?;
    Ok(ExtendedPubKey::from_priv(secp, &xprv))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_account_is_deterministic() {
        let mnemonic = Mnemonic::parse(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
        )
        .unwrap();

        let a = derive_account(&mnemonic, Network::Bitcoin, 0).unwrap();
        let b = derive_account(&mnemonic, Network::Bitcoin, 0).unwrap();

        assert_eq!(a.wallet_key, b.wallet_key);
        assert_eq!(a.ordinal_key, b.ordinal_key);
        assert_eq!(a.identity_key, b.identity_key);
    }

    #[test]
    fn different_accounts_have_different_wallet_keys() {
        let mnemonic = Mnemonic::parse(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
        )
        .unwrap();

        let a = derive_account(&mnemonic, Network::Bitcoin, 0).unwrap();
        let b = derive_account(&mnemonic, Network::Bitcoin, 1).unwrap();

        assert_ne!(a.wallet_key, b.wallet_key);
        // The identity root is shared across accounts for a given mnemonic.
        assert_eq!(a.identity_key, b.identity_key);
    }

    #[test]
    fn brc42_child_private_and_public_agree() {
        let secp = SECP256K1;
        let receiver_priv = SecretKey::new(&mut bitcoin::secp256k1::rand::thread_rng());
        let sender_priv = SecretKey::new(&mut bitcoin::secp256k1::rand::thread_rng());
        let receiver_pub = PublicKey::from_secret_key(secp, &receiver_priv);
        let sender_pub = PublicKey::from_secret_key(secp, &sender_priv);

        let invoice_number = "2024-01-01 1";

        let child_priv =
            derive_child_private_key(&receiver_priv, &sender_pub, invoice_number).unwrap();
        let child_pub_from_priv = PublicKey::from_secret_key(secp, &child_priv);

        let child_pub =
            derive_child_public_key(&receiver_pub, &sender_priv, invoice_number).unwrap();

        assert_eq!(child_pub_from_priv, child_pub);
    }

    #[test]
    fn known_tagged_key_bypasses_derivation() {
        let root = SecretKey::new(&mut bitcoin::secp256k1::rand::thread_rng());
        let tagged =
            derive_tagged_key(&root, "yours", "identity", None, Network::Bitcoin).unwrap();
        assert_eq!(tagged.private_key, root);
    }

    #[test]
    fn tagged_key_is_deterministic_in_the_tag() {
        let root = SecretKey::new(&mut bitcoin::secp256k1::rand::thread_rng());
        let a = derive_tagged_key(&root, "app", "1", Some("example.com"), Network::Bitcoin).unwrap();
        let b = derive_tagged_key(&root, "app", "1", Some("example.com"), Network::Bitcoin).unwrap();
        let c = derive_tagged_key(&root, "app", "2", Some("example.com"), Network::Bitcoin).unwrap();

        assert_eq!(a.private_key, b.private_key);
        assert_ne!(a.private_key, c.private_key);
    }
}
