pub(crate) mod context_network;
pub(crate) mod feature_encoder;
pub(crate) mod latent_model;
